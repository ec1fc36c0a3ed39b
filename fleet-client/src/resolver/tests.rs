use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Barrier;

use fleet_shared::service::Service;

use super::*;
use crate::errors::is_expected;

const UUID: &str = "7cf02a62d8e04f1c9b3e23b8e0a1f6a1";

/// In-memory data API. Devices are stored as raw JSON so a test can hand
/// back exactly what the cloud would.
#[derive(Default)]
struct MockApi {
    devices: Mutex<HashMap<String, serde_json::Value>>,
    services: Mutex<HashMap<u64, Service>>,
    queries: Mutex<Vec<DeviceQuery>>,
    device_reads: AtomicUsize,
    service_reads: AtomicUsize,
    gate: Option<Barrier>,
}

impl MockApi {
    fn with_device(self, uuid: &str, device: serde_json::Value) -> Self {
        self.set_device(uuid, device);
        self
    }

    fn with_service(self, id: u64, name: &str) -> Self {
        self.services.lock().unwrap().insert(
            id,
            Service {
                id: Some(id),
                service_name: Some(name.to_string()),
            },
        );
        self
    }

    fn with_gate(mut self, callers: usize) -> Self {
        self.gate = Some(Barrier::new(callers));
        self
    }

    fn set_device(&self, uuid: &str, device: serde_json::Value) {
        self.devices.lock().unwrap().insert(uuid.to_string(), device);
    }

    fn device_reads(&self) -> usize {
        self.device_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataApi for MockApi {
    async fn get_device(&self, uuid: &str, query: &DeviceQuery) -> Result<Device> {
        self.device_reads.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        let raw = self
            .devices
            .lock()
            .unwrap()
            .get(uuid)
            .cloned()
            .ok_or_else(|| anyhow!("Device not found: {}", uuid))?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn get_service(&self, service_id: u64, select: &[&str]) -> Result<Option<Service>> {
        self.service_reads.fetch_add(1, Ordering::SeqCst);
        assert_eq!(select, ["service_name"]);
        Ok(self.services.lock().unwrap().get(&service_id).cloned())
    }
}

fn owned_device() -> serde_json::Value {
    json!({
        "id": 10,
        "uuid": UUID,
        "device_name": "lobby-display",
        "belongs_to__application": [{"id": 5, "app_name": "signage"}]
    })
}

fn orphaned_device() -> serde_json::Value {
    json!({
        "id": 11,
        "uuid": UUID,
        "device_name": "loaner",
        "belongs_to__application": []
    })
}

fn resolver(api: Arc<MockApi>) -> Resolver {
    Resolver::new(api, Arc::new(ResolutionCache::new()))
}

#[tokio::test]
async fn test_resolves_device_and_app() {
    let api = Arc::new(MockApi::default().with_device(UUID, owned_device()));
    let resolver = resolver(api.clone());

    let resolved = resolver.resolve_device_and_app(UUID, None, None).await.unwrap();
    assert_eq!(resolved.device.device_name.as_deref(), Some("lobby-display"));
    assert_eq!(resolved.application.id, Some(5));
    assert_eq!(resolved.application.app_name.as_deref(), Some("signage"));
    assert_eq!(api.device_reads(), 1);
}

#[tokio::test]
async fn test_maybe_app_returns_absent_for_empty_relation() {
    let api = Arc::new(MockApi::default().with_device(UUID, orphaned_device()));
    let resolver = resolver(api);

    let resolved = resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap();
    assert_eq!(resolved.device.id, Some(11));
    assert!(resolved.application.is_none());
}

#[tokio::test]
async fn test_maybe_app_returns_absent_for_empty_row() {
    let mut device = owned_device();
    device["belongs_to__application"] = json!([{}]);
    let api = Arc::new(MockApi::default().with_device(UUID, device));
    let resolver = resolver(api);

    let resolved = resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap();
    assert!(resolved.application.is_none());
}

#[tokio::test]
async fn test_strict_resolution_fails_with_expected_error() {
    let api = Arc::new(MockApi::default().with_device(UUID, orphaned_device()));
    let resolver = resolver(api);

    let err = resolver
        .resolve_device_and_app(UUID, None, None)
        .await
        .unwrap_err();
    assert!(is_expected(&err));
    let message = err.to_string();
    assert!(message.contains(UUID));
    assert!(message.contains("Unable to access the application"));
    assert!(message.contains("Hint: check whether the application owner"));
}

#[tokio::test]
async fn test_strict_failure_is_not_cached() {
    let api = Arc::new(MockApi::default().with_device(UUID, orphaned_device()));
    let resolver = resolver(api.clone());

    assert!(resolver.resolve_device_and_app(UUID, None, None).await.is_err());
    assert!(resolver.cache().cached_device_and_app(UUID).is_none());
    // the partial result underneath is cached though
    assert!(resolver.cache().cached_device_and_maybe_app(UUID).is_some());
    assert!(resolver.resolve_device_and_app(UUID, None, None).await.is_err());
    assert_eq!(api.device_reads(), 1);
}

#[tokio::test]
async fn test_repeat_call_returns_same_cached_object() {
    let api = Arc::new(MockApi::default().with_device(UUID, owned_device()));
    let resolver = resolver(api.clone());

    let first = resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap();
    // remote state changes; the cache does not notice
    api.set_device(UUID, orphaned_device());
    let second = resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.application.is_some());
    assert_eq!(api.device_reads(), 1);
}

#[tokio::test]
async fn test_strict_and_partial_caches_are_independent() {
    let api = Arc::new(MockApi::default().with_device(UUID, owned_device()));
    let resolver = resolver(api.clone());

    let strict = resolver.resolve_device_and_app(UUID, None, None).await.unwrap();
    let again = resolver.resolve_device_and_app(UUID, None, None).await.unwrap();
    assert!(Arc::ptr_eq(&strict, &again));
    // the strict call populated the partial cache on its way
    resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap();
    assert_eq!(api.device_reads(), 1);
}

#[tokio::test]
async fn test_selector_is_ignored_by_cache_key() {
    let api = Arc::new(MockApi::default().with_device(UUID, json!({"uuid": UUID})));
    let resolver = resolver(api.clone());

    let narrow = resolver
        .resolve_device_and_maybe_app(UUID, Some(&["uuid"]), None)
        .await
        .unwrap();
    api.set_device(UUID, owned_device());
    let broad = resolver
        .resolve_device_and_maybe_app(UUID, Some(&["uuid", "device_name"]), None)
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&narrow, &broad));
    assert_eq!(broad.device.device_name, None);
    assert_eq!(api.device_reads(), 1);
}

#[tokio::test]
async fn test_selection_key_mode_refetches_on_new_selector() {
    let api = Arc::new(MockApi::default().with_device(UUID, json!({"uuid": UUID})));
    let resolver = resolver(api.clone()).with_key_mode(CacheKeyMode::Selection);

    resolver
        .resolve_device_and_maybe_app(UUID, Some(&["uuid"]), None)
        .await
        .unwrap();
    api.set_device(UUID, owned_device());
    let broad = resolver
        .resolve_device_and_maybe_app(UUID, Some(&["uuid", "device_name"]), None)
        .await
        .unwrap();
    assert_eq!(broad.device.device_name.as_deref(), Some("lobby-display"));

    // same selector again is a hit
    resolver
        .resolve_device_and_maybe_app(UUID, Some(&["uuid", "device_name"]), None)
        .await
        .unwrap();
    assert_eq!(api.device_reads(), 2);
}

#[tokio::test]
async fn test_selectors_shape_the_remote_query() {
    let api = Arc::new(MockApi::default().with_device(UUID, owned_device()));
    let resolver = resolver(api.clone());

    resolver
        .resolve_device_and_maybe_app(UUID, Some(&["uuid"]), Some(&["id", "app_name"]))
        .await
        .unwrap();

    let queries = api.queries.lock().unwrap();
    assert_eq!(
        queries[0],
        DeviceQuery::with_application(Some(&["uuid"]), Some(&["id", "app_name"]))
    );
}

#[tokio::test]
async fn test_transport_error_propagates_unwrapped_and_uncached() {
    let api = Arc::new(MockApi::default());
    let resolver = resolver(api.clone());

    let err = resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap_err();
    assert!(!is_expected(&err));
    assert_eq!(err.to_string(), format!("Device not found: {}", UUID));

    let err = resolver
        .resolve_device_and_app(UUID, None, None)
        .await
        .unwrap_err();
    assert!(!is_expected(&err));

    assert!(resolver.cache().is_empty());
    assert_eq!(api.device_reads(), 2);
}

#[tokio::test]
async fn test_cache_keys_are_not_normalized() {
    let api = Arc::new(
        MockApi::default()
            .with_device(UUID, owned_device())
            .with_device("7cf02a6", owned_device()),
    );
    let resolver = resolver(api.clone());

    resolver
        .resolve_device_and_maybe_app(UUID, None, None)
        .await
        .unwrap();
    resolver
        .resolve_device_and_maybe_app("7cf02a6", None, None)
        .await
        .unwrap();
    assert_eq!(api.device_reads(), 2);
}

#[tokio::test]
async fn test_service_name_lookup() {
    let api = Arc::new(MockApi::default().with_service(7, "frontend"));
    let resolver = resolver(api.clone());

    assert_eq!(
        resolver.resolve_service_name(7).await.unwrap().as_deref(),
        Some("frontend")
    );
    assert_eq!(resolver.resolve_service_name(42).await.unwrap(), None);
    // both answers, including the miss, are memoized
    resolver.resolve_service_name(7).await.unwrap();
    resolver.resolve_service_name(42).await.unwrap();
    assert_eq!(api.service_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_overlapping_calls_are_not_coalesced() {
    let api = Arc::new(
        MockApi::default()
            .with_device(UUID, owned_device())
            .with_gate(2),
    );
    let resolver = resolver(api.clone());

    let (a, b) = futures::join!(
        resolver.resolve_device_and_maybe_app(UUID, None, None),
        resolver.resolve_device_and_maybe_app(UUID, None, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(api.device_reads(), 2);
    // the first completed write wins the cache slot
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_shared_cache_across_resolvers() {
    let api = Arc::new(MockApi::default().with_device(UUID, owned_device()));
    let cache = Arc::new(ResolutionCache::new());
    let first = Resolver::new(api.clone(), cache.clone());
    let second = Resolver::new(api.clone(), cache.clone());

    let a = first.resolve_device_and_maybe_app(UUID, None, None).await.unwrap();
    let b = second.resolve_device_and_maybe_app(UUID, None, None).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(api.device_reads(), 1);

    cache.clear();
    assert!(cache.is_empty());
    second.resolve_device_and_maybe_app(UUID, None, None).await.unwrap();
    assert_eq!(api.device_reads(), 2);
}
