//! Command usage analytics.
//!
//! Only the command template is reported (`device info <uuid>`), never the
//! arguments a user typed. Tracking is best effort: it is bounded by
//! [`TRACK_TIMEOUT`] and never fails the command it reports on.

use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::server::{ApiClient, TrackEvent, TrackProperties};

pub const TRACK_TIMEOUT: Duration = Duration::from_millis(100);

const NO_ANALYTICS_ENV: &str = "FLEET_NO_ANALYTICS";

static PLATFORM: Lazy<String> =
    Lazy::new(|| format!("{}-{}", std::env::consts::OS, std::env::consts::FAMILY));

pub fn analytics_enabled(configured: bool) -> bool {
    configured && std::env::var_os(NO_ANALYTICS_ENV).is_none()
}

pub async fn track_command(client: &ApiClient, api_host: &str, signature: &str) {
    match tokio::time::timeout(TRACK_TIMEOUT, send(client, api_host, signature)).await {
        Ok(Ok(())) => debug!("Tracked command '{}'", signature),
        Ok(Err(e)) => debug!("Failed to track command '{}': {}", signature, e),
        Err(_) => debug!("Tracking command '{}' timed out", signature),
    }
}

pub fn build_event(signature: &str, username: Option<String>, api_host: &str) -> TrackEvent {
    TrackEvent {
        event: format!("[CLI] {}", signature),
        properties: TrackProperties {
            distinct_id: username,
            version: env!("CARGO_PKG_VERSION").to_string(),
            arch: std::env::consts::ARCH.to_string(),
            platform: PLATFORM.clone(),
            api_host: api_host.to_string(),
        },
    }
}

async fn send(client: &ApiClient, api_host: &str, signature: &str) -> Result<()> {
    let username = client.whoami().await.unwrap_or(None);
    let event = build_event(signature, username, api_host);
    client.track(&event).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_event() {
        let event = build_event(
            "device info <uuid>",
            Some("jdoe".to_string()),
            "api.fleet-cloud.io",
        );
        assert_eq!(event.event, "[CLI] device info <uuid>");
        assert_eq!(event.properties.distinct_id.as_deref(), Some("jdoe"));
        assert_eq!(event.properties.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(event.properties.arch, std::env::consts::ARCH);
        assert!(event.properties.platform.starts_with(std::env::consts::OS));
        assert_eq!(event.properties.api_host, "api.fleet-cloud.io");
    }

    #[test]
    fn test_disabled_by_config() {
        assert!(!analytics_enabled(false));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_swallowed() {
        let client = ApiClient::new("http://127.0.0.1:1", Some("t".into()), false).unwrap();
        let start = std::time::Instant::now();
        track_command(&client, "127.0.0.1:1", "devices").await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
