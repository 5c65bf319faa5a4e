//! In-memory TtlStore implementation.
//!
//! Expiry uses `tokio::time::Instant`, so tests can drive it with
//! `tokio::time::pause` and `advance`. Expired keys are dropped when read, and
//! every write past the sweep deadline also drops every other expired key.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::{Result, StoreError, TtlStore};

/// Default interval between full sweeps of expired keys.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Inner {
    entries: HashMap<String, Entry>,
    next_sweep: Instant,
}

impl Inner {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Drop every expired key once the sweep deadline has passed.
    fn sweep_if_due(&mut self, interval: Duration) {
        let now = Instant::now();
        if now < self.next_sweep {
            return;
        }
        self.next_sweep = now + interval;
        Self::sweep(&mut self.entries, now);
    }

    fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            trace!(removed, remaining = entries.len(), "swept expired keys");
        }
        removed
    }

    fn insert_str(&mut self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// In-memory implementation of TtlStore.
pub struct InMemoryTtlStore {
    inner: Mutex<Inner>,
    sweep_interval: Duration,
}

impl Default for InMemoryTtlStore {
    fn default() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }
}

impl InMemoryTtlStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_sweep: Instant::now() + sweep_interval,
            }),
            sweep_interval,
        }
    }

    /// Remaining time to live of a key.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Number of keys held, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired key now. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        Inner::sweep(&mut inner.entries, Instant::now())
    }

    async fn writer(&self) -> tokio::sync::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().await;
        inner.sweep_if_due(self.sweep_interval);
        inner
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::InvalidData(format!("wrong value type for key {key}"))
}

#[async_trait]
impl TtlStore for InMemoryTtlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.writer().await.insert_str(key, value.to_string(), ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.writer().await;
        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner.insert_str(key, value.to_string(), ttl);
        Ok(true)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut inner = self.writer().await;
        let current = match inner.live(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => s
                .parse::<i64>()
                .map_err(|_| StoreError::InvalidData(format!("value of {key} is not an integer")))?,
            Some(_) => return Err(wrong_type(key)),
            None => 0,
        };

        let next = current + 1;
        inner.insert_str(key, next.to_string(), ttl);
        Ok(next)
    }

    async fn hset(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut inner = self.writer().await;
        let expires_at = Instant::now() + ttl;
        match inner.live(key) {
            Some(entry) => match &mut entry.value {
                Value::Hash(map) => {
                    map.insert(field.to_string(), value.to_string());
                    entry.expires_at = expires_at;
                }
                Value::Str(_) => return Err(wrong_type(key)),
            },
            None => {
                let map = HashMap::from([(field.to_string(), value.to_string())]);
                inner.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Hash(map),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            Some(Entry {
                value: Value::Hash(map),
                ..
            }) => Ok(map.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            Some(Entry {
                value: Value::Hash(map),
                ..
            }) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn key_exists(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.live(key).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        Ok(inner.entries.remove(key).is_some_and(|e| e.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn keys_expire_after_ttl() {
        let store = InMemoryTtlStore::new();
        store.set("k", "v", MINUTE).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(MINUTE + Duration::from_secs(1)).await;

        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.key_exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_only_writes_once_per_window() {
        let store = InMemoryTtlStore::new();
        assert!(store.set_if_absent("w", "1", MINUTE).await.unwrap());
        assert!(!store.set_if_absent("w", "2", MINUTE).await.unwrap());
        assert_eq!(store.get("w").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(MINUTE).await;
        assert!(store.set_if_absent("w", "3", MINUTE).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_counts_and_refreshes_ttl() {
        let store = InMemoryTtlStore::new();
        assert_eq!(store.incr("c", MINUTE).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.incr("c", MINUTE).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.incr("c", MINUTE).await.unwrap(), 3);

        tokio::time::advance(MINUTE * 2).await;
        assert_eq!(store.incr("c", MINUTE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hash_fields() {
        let store = InMemoryTtlStore::new();
        store.hset("h", "a", "1", MINUTE).await.unwrap();
        store.hset("h", "b", "2", MINUTE).await.unwrap();

        assert_eq!(store.hget("h", "a").await.unwrap().as_deref(), Some("1"));
        assert!(store.hget("h", "z").await.unwrap().is_none());
        assert_eq!(store.hget_all("h").await.unwrap().len(), 2);
        assert!(store.hget_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let store = InMemoryTtlStore::new();
        store.set("s", "x", MINUTE).await.unwrap();
        assert!(store.hget("s", "f").await.is_err());
        assert!(store.incr("s", MINUTE).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_reports_remaining_time() {
        let store = InMemoryTtlStore::new();
        store.set("k", "v", MINUTE).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(store.ttl("k").await, Some(Duration::from_secs(40)));
        assert_eq!(store.ttl("nope").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_keys_nobody_reads_again() {
        let store = InMemoryTtlStore::new();
        for i in 0..1000 {
            store
                .set(&format!("window:{i}"), "1", MINUTE)
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 1000);

        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        store.set("fresh", "1", MINUTE).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("fresh").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_before_the_sweep_deadline_keep_expired_keys() {
        let store = InMemoryTtlStore::with_sweep_interval(MINUTE * 10);
        store.set("short", "1", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        store.set("other", "1", MINUTE).await.unwrap();
        assert_eq!(store.len().await, 2);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_reports_live_keys_only() {
        let store = InMemoryTtlStore::new();
        store.set("k", "v", MINUTE).await.unwrap();
        store.set("old", "v", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(!store.delete("old").await.unwrap());
        assert!(store.is_empty().await);
    }
}
