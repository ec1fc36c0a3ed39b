//! Device identity resolution.
//!
//! Maps a user supplied device UUID (short or full form) onto the device
//! record and the application that owns it, in a single data API read that
//! expands the ownership relation. Results are memoized per identifier for the
//! lifetime of the [`ResolutionCache`] handed in at construction.
//!
//! The cache key is the identifier alone unless [`CacheKeyMode::Selection`] is
//! chosen: a lookup made with a narrow field selection is served, unchanged,
//! to later lookups asking for more fields. Lookups are not coalesced while in
//! flight, so overlapping calls for one identifier may each hit the API.
//! Failures are never cached and never retried.

mod cache;

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use fleet_shared::{application::Application, device::Device, query::DeviceQuery};

use crate::{config::ResolverConfig, errors::ExpectedError, server::DataApi};

pub use cache::ResolutionCache;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAndApp {
    pub device: Device,
    pub application: Application,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAndMaybeApp {
    pub device: Device,
    /// `None` when the device has no owner or the caller cannot read it.
    pub application: Option<Application>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKeyMode {
    /// Key on the identifier only; selectors are ignored.
    #[default]
    Identifier,
    /// Key on the identifier plus the requested selection.
    Selection,
}

impl From<&ResolverConfig> for CacheKeyMode {
    fn from(config: &ResolverConfig) -> Self {
        if config.selection_in_cache_key {
            CacheKeyMode::Selection
        } else {
            CacheKeyMode::Identifier
        }
    }
}

#[derive(Clone)]
pub struct Resolver {
    api: Arc<dyn DataApi>,
    cache: Arc<ResolutionCache>,
    key_mode: CacheKeyMode,
}

impl Resolver {
    pub fn new(api: Arc<dyn DataApi>, cache: Arc<ResolutionCache>) -> Self {
        Self {
            api,
            cache,
            key_mode: CacheKeyMode::default(),
        }
    }

    pub fn with_key_mode(mut self, key_mode: CacheKeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Device plus owning application. Fails with [`ExpectedError`] when the
    /// application cannot be read, typically because its owner withdrew the
    /// caller's access while the device stayed on the caller's account.
    pub async fn resolve_device_and_app(
        &self,
        uuid: &str,
        device_fields: Option<&[&str]>,
        app_fields: Option<&[&str]>,
    ) -> Result<Arc<DeviceAndApp>> {
        let key = self.device_key(uuid, device_fields, app_fields);
        if let Some(hit) = self.cache.cached_device_and_app(&key) {
            debug!("Resolver cache hit for device {}", uuid);
            return Ok(hit);
        }

        let resolved = self
            .resolve_device_and_maybe_app(uuid, device_fields, app_fields)
            .await?;
        let Some(application) = resolved.application.clone() else {
            return Err(ExpectedError::new(format!(
                "Unable to access the application that device {} belongs to.\n\
                 Hint: check whether the application owner might have withdrawn access to it.",
                uuid
            ))
            .into());
        };

        let value = DeviceAndApp {
            device: resolved.device.clone(),
            application,
        };
        Ok(self.cache.store_device_and_app(key, value))
    }

    /// Device plus owning application if readable. Only the device read
    /// itself can fail.
    pub async fn resolve_device_and_maybe_app(
        &self,
        uuid: &str,
        device_fields: Option<&[&str]>,
        app_fields: Option<&[&str]>,
    ) -> Result<Arc<DeviceAndMaybeApp>> {
        let key = self.device_key(uuid, device_fields, app_fields);
        if let Some(hit) = self.cache.cached_device_and_maybe_app(&key) {
            debug!("Resolver cache hit for device {}", uuid);
            return Ok(hit);
        }

        debug!("Resolving device {} and its application", uuid);
        let query = DeviceQuery::with_application(device_fields, app_fields);
        let device = self.api.get_device(uuid, &query).await?;
        let application = device.expanded_application()?;
        if application.is_none() {
            debug!("Application of device {} is not readable", uuid);
        }

        let value = DeviceAndMaybeApp {
            device,
            application,
        };
        Ok(self.cache.store_device_and_maybe_app(key, value))
    }

    /// Display name of a service, `None` if there is no such service.
    pub async fn resolve_service_name(&self, service_id: u64) -> Result<Option<String>> {
        if let Some(hit) = self.cache.cached_service_name(service_id) {
            debug!("Resolver cache hit for service {}", service_id);
            return Ok(hit);
        }

        let service = self.api.get_service(service_id, &["service_name"]).await?;
        let name = service.and_then(|s| s.service_name);
        Ok(self.cache.store_service_name(service_id, name))
    }

    fn device_key(
        &self,
        uuid: &str,
        device_fields: Option<&[&str]>,
        app_fields: Option<&[&str]>,
    ) -> String {
        match self.key_mode {
            CacheKeyMode::Identifier => uuid.to_string(),
            CacheKeyMode::Selection => format!(
                "{}?{}",
                uuid,
                DeviceQuery::with_application(device_fields, app_fields).fingerprint()
            ),
        }
    }
}

#[cfg(test)]
mod tests;
