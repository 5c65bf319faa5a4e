//! Configuration for the ingestion consumer group.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Topics, consumer group and batching settings for queue consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Topics the consumer group subscribes to.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Consumer group name.
    #[serde(default = "default_group")]
    pub group: String,

    /// Maximum messages handed to the dispatcher per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time to wait while filling a batch.
    #[serde(default = "default_batch_timeout", with = "humantime_serde")]
    pub batch_timeout: Duration,

    /// Session timeout for the consumer group membership.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,
}

fn default_topics() -> Vec<String> {
    vec!["classroom-behavior".to_string()]
}

fn default_group() -> String {
    "classpulse-ingest".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            group: default_group(),
            batch_size: default_batch_size(),
            batch_timeout: default_batch_timeout(),
            session_timeout: default_session_timeout(),
        }
    }
}

impl QueueConfig {
    /// Replace the subscribed topics.
    #[must_use]
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set the consumer group name.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the batch timeout.
    #[must_use]
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = QueueConfig::default();

        assert_eq!(config.topics, vec!["classroom-behavior".to_string()]);
        assert_eq!(config.group, "classpulse-ingest");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_timeout, Duration::from_secs(1));
        assert_eq!(config.session_timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_builder_pattern() {
        let config = QueueConfig::default()
            .with_topics(["teacher", "student"])
            .with_group("replay")
            .with_batch_size(0)
            .with_batch_timeout(Duration::from_millis(250));

        assert_eq!(config.topics, vec!["teacher", "student"]);
        assert_eq!(config.group, "replay");
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.batch_timeout, Duration::from_millis(250));
    }

    #[test]
    fn config_parses_humantime_durations() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"topics": ["a"], "batch_timeout": "500ms", "session_timeout": "1m"}"#,
        )
        .unwrap();

        assert_eq!(config.batch_timeout, Duration::from_millis(500));
        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.group, "classpulse-ingest");
    }
}
