use super::types::{
    ClasspulseConfig, RawClasspulseConfig, RawDispatcherConfig, RawGuardConfig, RawQueueConfig,
    RawSessionConfig, StorageConfig,
};
use anyhow::Result;
use classpulse_core::{GuardConfig, SessionConfig};
use classpulse_ingest::DispatcherConfig;
use classpulse_queue::QueueConfig;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<ClasspulseConfig> {
        let mut raw = RawClasspulseConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Load a single config file, applying defaults. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<ClasspulseConfig> {
        if !path.exists() {
            return Ok(ClasspulseConfig::default());
        }
        Ok(Self::finalize(Self::read_raw(path)?))
    }

    fn read_raw(path: &Path) -> Result<RawClasspulseConfig> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "classpulse").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with CLASSPULSE_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("CLASSPULSE_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".classpulse/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawClasspulseConfig, overlay: RawClasspulseConfig) -> RawClasspulseConfig {
        RawClasspulseConfig {
            queue: RawQueueConfig {
                topics: overlay.queue.topics.or(base.queue.topics),
                group: overlay.queue.group.or(base.queue.group),
                batch_size: overlay.queue.batch_size.or(base.queue.batch_size),
                batch_timeout: overlay.queue.batch_timeout.or(base.queue.batch_timeout),
                session_timeout: overlay.queue.session_timeout.or(base.queue.session_timeout),
            },
            dispatcher: RawDispatcherConfig {
                store_timeout: overlay
                    .dispatcher
                    .store_timeout
                    .or(base.dispatcher.store_timeout),
            },
            guard: RawGuardConfig {
                marker_ttl: overlay.guard.marker_ttl.or(base.guard.marker_ttl),
                attention_window: overlay
                    .guard
                    .attention_window
                    .or(base.guard.attention_window),
            },
            session: RawSessionConfig {
                cache_ttl: overlay.session.cache_ttl.or(base.session.cache_ttl),
                close_grace: overlay.session.close_grace.or(base.session.close_grace),
                page_size: overlay.session.page_size.or(base.session.page_size),
            },
            storage: StorageConfig {
                database_path: overlay
                    .storage
                    .database_path
                    .or(base.storage.database_path),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawClasspulseConfig) -> ClasspulseConfig {
        let queue_defaults = QueueConfig::default();
        let dispatcher_defaults = DispatcherConfig::default();
        let guard_defaults = GuardConfig::default();
        let session_defaults = SessionConfig::default();

        ClasspulseConfig {
            queue: QueueConfig {
                topics: raw.queue.topics.unwrap_or(queue_defaults.topics),
                group: raw.queue.group.unwrap_or(queue_defaults.group),
                batch_size: raw
                    .queue
                    .batch_size
                    .map_or(queue_defaults.batch_size, |size| size.max(1)),
                batch_timeout: raw.queue.batch_timeout.unwrap_or(queue_defaults.batch_timeout),
                session_timeout: raw
                    .queue
                    .session_timeout
                    .unwrap_or(queue_defaults.session_timeout),
            },
            dispatcher: DispatcherConfig {
                store_timeout: raw
                    .dispatcher
                    .store_timeout
                    .unwrap_or(dispatcher_defaults.store_timeout),
            },
            guard: GuardConfig {
                marker_ttl: raw.guard.marker_ttl.unwrap_or(guard_defaults.marker_ttl),
                attention_window: raw
                    .guard
                    .attention_window
                    .unwrap_or(guard_defaults.attention_window),
            },
            session: SessionConfig {
                cache_ttl: raw.session.cache_ttl.unwrap_or(session_defaults.cache_ttl),
                close_grace: raw.session.close_grace.unwrap_or(session_defaults.close_grace),
                page_size: raw
                    .session
                    .page_size
                    .map_or(session_defaults.page_size, |size| size.max(1)),
            },
            storage: raw.storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    // ==================== Load Tests ====================

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config, ClasspulseConfig::default());
    }

    #[test]
    fn test_load_from_valid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[queue]
topics = ["behavior", "chat"]
batch_size = 0

[dispatcher]
store_timeout = "10s"

[session]
close_grace = "1m"

[storage]
database_path = "/tmp/classpulse.db"
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config.queue.topics, vec!["behavior", "chat"]);
        assert_eq!(config.queue.batch_size, 1);
        assert_eq!(config.queue.group, "classpulse-ingest");
        assert_eq!(config.dispatcher.store_timeout, Duration::from_secs(10));
        assert_eq!(config.session.close_grace, Duration::from_secs(60));
        assert_eq!(config.session.page_size, 100);
        assert_eq!(
            config.storage.database_path,
            Some(PathBuf::from("/tmp/classpulse.db"))
        );
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invalid.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        assert!(ConfigLoader::load_from_path(&path).is_err());
    }

    #[test]
    fn test_load_invalid_duration_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[guard]\nmarker_ttl = \"forever\"\n").unwrap();

        assert!(ConfigLoader::load_from_path(&path).is_err());
    }

    // ==================== Merge Tests ====================

    #[test]
    fn test_merge_raw_overlay_overrides_base() {
        let base: RawClasspulseConfig = toml::from_str(
            r#"
[queue]
group = "user-group"
batch_size = 20

[storage]
database_path = "/home/teacher/classpulse.db"
"#,
        )
        .unwrap();
        let overlay: RawClasspulseConfig = toml::from_str(
            r#"
[queue]
group = "project-group"

[guard]
marker_ttl = "12h"
"#,
        )
        .unwrap();

        let merged = ConfigLoader::finalize(ConfigLoader::merge_raw(base, overlay));

        assert_eq!(merged.queue.group, "project-group");
        assert_eq!(merged.queue.batch_size, 20);
        assert_eq!(merged.guard.marker_ttl, Duration::from_secs(12 * 60 * 60));
        assert_eq!(
            merged.storage.database_path,
            Some(PathBuf::from("/home/teacher/classpulse.db"))
        );
    }

    #[test]
    fn test_merge_raw_none_preserves_base() {
        let base: RawClasspulseConfig =
            toml::from_str("[dispatcher]\nstore_timeout = \"30s\"\n").unwrap();

        let merged = ConfigLoader::merge_raw(base, RawClasspulseConfig::default());

        assert_eq!(merged.dispatcher.store_timeout, Some(Duration::from_secs(30)));
    }

    // ==================== Path Tests ====================

    #[test]
    fn test_user_config_path_returns_some() {
        let path = ConfigLoader::user_config_path();
        if let Some(p) = path {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_project_config_path() {
        let path = ConfigLoader::project_config_path();
        assert!(path.ends_with("config.toml"));
    }
}
