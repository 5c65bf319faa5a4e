//! Subcommand implementations.

pub mod action;
pub mod config;
pub mod replay;
pub mod signals;

use std::sync::Arc;

use anyhow::{Context, Result};
use classpulse_core::{
    ActionGuard, BehaviorStore, InMemoryBehaviorStore, InMemoryTtlStore, TtlStore,
    TursoBehaviorStore,
};
use tracing::{debug, warn};

use crate::config::{ClasspulseConfig, StorageConfig};

/// Stores shared by every command in one invocation.
pub struct Backend {
    pub store: Arc<dyn BehaviorStore>,
    pub ttl: Arc<dyn TtlStore>,
}

impl Backend {
    /// Open the configured behavior store with a process-local TTL store.
    pub async fn open(storage: &StorageConfig) -> Result<Self> {
        let store: Arc<dyn BehaviorStore> = match &storage.database_path {
            Some(path) => {
                debug!(path = %path.display(), "Opening behavior database");
                let store = TursoBehaviorStore::new_local(path)
                    .await
                    .with_context(|| format!("Failed to open database {}", path.display()))?;
                Arc::new(store)
            }
            None => {
                debug!("No database configured, keeping rows in memory");
                Arc::new(InMemoryBehaviorStore::new())
            }
        };

        Ok(Self {
            store,
            ttl: Arc::new(InMemoryTtlStore::new()),
        })
    }

    /// Like [`open`](Self::open), but warns when nothing would outlive the process.
    pub async fn open_persistent(storage: &StorageConfig) -> Result<Self> {
        if storage.database_path.is_none() {
            warn!("storage.database_path is not set; reading from an empty in-memory store");
        }
        Self::open(storage).await
    }

    pub fn guard(&self, config: &ClasspulseConfig) -> Arc<ActionGuard> {
        Arc::new(ActionGuard::with_config(
            self.store.clone(),
            self.ttl.clone(),
            config.guard.clone(),
        ))
    }
}
