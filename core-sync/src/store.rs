//! # State Store
//!
//! Durable home of the [`SyncState`] between chunks.
//!
//! Each call writes or removes one key in the settings store, so a reader never
//! observes half of a state. The report of the last finished run is kept under
//! a separate key so it can still be polled after the state itself is deleted.

use crate::state::{SyncReport, SyncState};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::storage::SettingsStore;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const STATE_KEY: &str = "push_sync.state";
pub const LAST_REPORT_KEY: &str = "push_sync.last_report";

/// Persistence contract for sync progress
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn load(&self) -> Result<Option<SyncState>>;

    async fn save(&self, state: &SyncState) -> Result<()>;

    async fn delete(&self) -> Result<()>;

    async fn save_report(&self, report: &SyncReport) -> Result<()>;

    async fn load_report(&self) -> Result<Option<SyncReport>>;
}

/// [`SyncStateStore`] backed by a [`SettingsStore`], one JSON document per key
pub struct SettingsStateStore {
    settings: Arc<dyn SettingsStore>,
}

impl SettingsStateStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.settings.get_string(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SyncError::Storage(format!("Corrupt record under {}: {}", key, e)))
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| SyncError::Storage(format!("Failed to encode {}: {}", key, e)))?;
        self.settings.set_string(key, &raw).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for SettingsStateStore {
    async fn load(&self) -> Result<Option<SyncState>> {
        self.read(STATE_KEY).await
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        self.write(STATE_KEY, state).await?;
        debug!(
            run_id = %state.run_id,
            stage = %state.stage,
            cursor = state.current_path_index,
            "Saved sync state"
        );
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.settings.delete(STATE_KEY).await?;
        Ok(())
    }

    async fn save_report(&self, report: &SyncReport) -> Result<()> {
        self.write(LAST_REPORT_KEY, report).await
    }

    async fn load_report(&self) -> Result<Option<SyncReport>> {
        self.read(LAST_REPORT_KEY).await
    }
}
