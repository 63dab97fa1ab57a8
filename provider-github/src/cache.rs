//! Short-TTL cache over the settings store
//!
//! Rate-limit numbers and ETag responses outlive a single chunk but are
//! worthless after a while. They live here, apart from configuration and
//! from sync progress, each wrapped in an envelope carrying its own expiry.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::HttpResponse;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "cache.";

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    expires_at_ms: i64,
    value: T,
}

/// Key-value cache whose entries expire after a per-entry TTL.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    /// Fetch a live entry. Expired or unreadable entries are dropped and read as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let storage_key = Self::storage_key(key);
        let Some(raw) = self.store.get_string(&storage_key).await? else {
            return Ok(None);
        };

        let envelope: Envelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = key, error = %e, "Discarding unreadable cache entry");
                self.store.delete(&storage_key).await?;
                return Ok(None);
            }
        };

        if envelope.expires_at_ms <= self.clock.unix_timestamp_millis() {
            debug!(key = key, "Cache entry expired");
            self.store.delete(&storage_key).await?;
            return Ok(None);
        }

        Ok(Some(envelope.value))
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let envelope = Envelope {
            expires_at_ms: self.clock.deadline_millis(ttl),
            value,
        };
        let raw = serde_json::to_string(&envelope).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode cache entry: {}", e))
        })?;
        self.store
            .set_string(&Self::storage_key(key), &raw)
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.delete(&Self::storage_key(key)).await
    }
}

/// A response body remembered alongside the ETag that validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub etag: String,
    pub status: u16,
    /// Base64 so arbitrary bytes survive the string-typed store
    pub body: String,
}

impl CachedResponse {
    pub fn from_response(etag: &str, response: &HttpResponse) -> Self {
        Self {
            etag: etag.to_string(),
            status: response.status,
            body: STANDARD.encode(&response.body),
        }
    }

    /// Rebuild the original response, byte for byte.
    pub fn to_response(&self) -> Result<HttpResponse> {
        let body = STANDARD.decode(self.body.as_bytes()).map_err(|e| {
            BridgeError::OperationFailed(format!("Corrupt cached response body: {}", e))
        })?;
        let mut headers = HashMap::new();
        headers.insert("ETag".to_string(), self.etag.clone());
        Ok(HttpResponse {
            status: self.status,
            headers,
            body: Bytes::from(body),
        })
    }
}
