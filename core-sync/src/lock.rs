//! TTL-bounded single-flight lock
//!
//! The record is `{owner, expires_at_ms}` under one settings key, written with
//! compare-and-swap so two starters racing on the same store cannot both win.
//! An expired record counts as free, which is what unwedges the system after a
//! process dies while holding it.

use crate::{Result, SyncError};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const LOCK_KEY: &str = "push_sync.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    owner: String,
    expires_at_ms: i64,
}

pub struct SyncLock {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SyncLock {
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            settings,
            clock,
            ttl,
        }
    }

    fn expires_at(&self) -> i64 {
        self.clock.deadline_millis(self.ttl)
    }

    async fn current(&self) -> Result<(Option<String>, Option<LockRecord>)> {
        let raw = self.settings.get_string(LOCK_KEY).await?;
        let record = match raw.as_deref() {
            Some(value) => match serde_json::from_str::<LockRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable lock record");
                    None
                }
            },
            None => None,
        };
        Ok((raw, record))
    }

    fn is_live(&self, record: &LockRecord) -> bool {
        record.expires_at_ms > self.clock.unix_timestamp_millis()
    }

    async fn write(&self, expected: Option<&str>, owner: &str) -> Result<bool> {
        let record = LockRecord {
            owner: owner.to_string(),
            expires_at_ms: self.expires_at(),
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| SyncError::Storage(format!("Failed to encode lock: {}", e)))?;
        Ok(self
            .settings
            .compare_and_swap(LOCK_KEY, expected, &value)
            .await?)
    }

    /// Take the lock for `owner`.
    ///
    /// Returns `false` when someone else holds a live lock.
    pub async fn acquire(&self, owner: &str) -> Result<bool> {
        let (raw, record) = self.current().await?;
        if let Some(record) = &record {
            if self.is_live(record) {
                debug!(holder = %record.owner, "Lock is held");
                return Ok(false);
            }
            warn!(holder = %record.owner, "Taking over expired lock");
        }

        let acquired = self.write(raw.as_deref(), owner).await?;
        debug!(owner = owner, acquired, "acquire_lock");
        Ok(acquired)
    }

    /// Push the expiry of `owner`'s lock out by one TTL.
    ///
    /// An expired or missing lock is re-taken. Returns `false` only when a
    /// different owner holds a live lock.
    pub async fn refresh(&self, owner: &str) -> Result<bool> {
        let (raw, record) = self.current().await?;
        if let Some(record) = &record {
            if record.owner != owner && self.is_live(record) {
                warn!(owner = owner, holder = %record.owner, "Lock owned by another run");
                return Ok(false);
            }
        }
        self.write(raw.as_deref(), owner).await
    }

    /// Release the lock if `owner` still holds it.
    pub async fn release(&self, owner: &str) -> Result<()> {
        let (_, record) = self.current().await?;
        match record {
            Some(record) if record.owner == owner => {
                self.settings.delete(LOCK_KEY).await?;
                debug!(owner = owner, "Lock released");
            }
            Some(record) => {
                warn!(owner = owner, holder = %record.owner, "Lock release: owned by another run");
            }
            None => {}
        }
        Ok(())
    }

    /// Drop the lock regardless of owner
    pub async fn force_release(&self) -> Result<()> {
        self.settings.delete(LOCK_KEY).await?;
        Ok(())
    }

    /// Owner of the live lock, if any
    pub async fn holder(&self) -> Result<Option<String>> {
        let (_, record) = self.current().await?;
        Ok(record
            .filter(|record| self.is_live(record))
            .map(|record| record.owner))
    }
}
