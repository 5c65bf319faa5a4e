use std::path::PathBuf;
use std::time::Duration;

use classpulse_core::{GuardConfig, SessionConfig};
use classpulse_ingest::DispatcherConfig;
use classpulse_queue::QueueConfig;
use serde::{Deserialize, Serialize};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawClasspulseConfig {
    #[serde(default)]
    pub queue: RawQueueConfig,

    #[serde(default)]
    pub dispatcher: RawDispatcherConfig,

    #[serde(default)]
    pub guard: RawGuardConfig,

    #[serde(default)]
    pub session: RawSessionConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawQueueConfig {
    pub topics: Option<Vec<String>>,
    pub group: Option<String>,
    pub batch_size: Option<usize>,
    #[serde(default, with = "humantime_serde::option")]
    pub batch_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub session_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDispatcherConfig {
    #[serde(default, with = "humantime_serde::option")]
    pub store_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawGuardConfig {
    #[serde(default, with = "humantime_serde::option")]
    pub marker_ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub attention_window: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSessionConfig {
    #[serde(default, with = "humantime_serde::option")]
    pub cache_ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub close_grace: Option<Duration>,
    pub page_size: Option<u32>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClasspulseConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// libSQL database file. Rows are kept in memory when unset.
    pub database_path: Option<PathBuf>,
}
