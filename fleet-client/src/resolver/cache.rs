use std::sync::Arc;

use dashmap::DashMap;

use super::{DeviceAndApp, DeviceAndMaybeApp};

/// Memoized resolver results for one process run.
///
/// One map per resolver operation. Entries are never evicted; `clear` exists
/// for callers that need a fresh view (tests, long-lived embedders).
#[derive(Debug, Default)]
pub struct ResolutionCache {
    pub(super) device_and_app: DashMap<String, Arc<DeviceAndApp>>,
    pub(super) device_and_maybe_app: DashMap<String, Arc<DeviceAndMaybeApp>>,
    pub(super) service_names: DashMap<u64, Option<String>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.device_and_app.clear();
        self.device_and_maybe_app.clear();
        self.service_names.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.device_and_app.is_empty()
            && self.device_and_maybe_app.is_empty()
            && self.service_names.is_empty()
    }

    pub fn cached_device_and_app(&self, key: &str) -> Option<Arc<DeviceAndApp>> {
        self.device_and_app.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn cached_device_and_maybe_app(&self, key: &str) -> Option<Arc<DeviceAndMaybeApp>> {
        self.device_and_maybe_app
            .get(key)
            .map(|e| Arc::clone(e.value()))
    }

    /// `Some(None)` records a lookup that found no service.
    pub fn cached_service_name(&self, service_id: u64) -> Option<Option<String>> {
        self.service_names.get(&service_id).map(|e| e.value().clone())
    }

    /// First completed write wins, so every later reader sees the same `Arc`.
    pub(super) fn store_device_and_app(
        &self,
        key: String,
        value: DeviceAndApp,
    ) -> Arc<DeviceAndApp> {
        Arc::clone(
            self.device_and_app
                .entry(key)
                .or_insert_with(|| Arc::new(value))
                .value(),
        )
    }

    pub(super) fn store_device_and_maybe_app(
        &self,
        key: String,
        value: DeviceAndMaybeApp,
    ) -> Arc<DeviceAndMaybeApp> {
        Arc::clone(
            self.device_and_maybe_app
                .entry(key)
                .or_insert_with(|| Arc::new(value))
                .value(),
        )
    }

    pub(super) fn store_service_name(
        &self,
        service_id: u64,
        name: Option<String>,
    ) -> Option<String> {
        self.service_names
            .entry(service_id)
            .or_insert(name)
            .value()
            .clone()
    }
}
