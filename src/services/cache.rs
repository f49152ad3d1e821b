//! TTL key-value cache for settings lookups
//!
//! Entries expire after a fixed TTL; there is no size-based eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Clone)]
struct CachedValue {
    value: Value,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct SettingsCache {
    entries: Arc<RwLock<HashMap<String, CachedValue>>>,
    ttl: Duration,
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new(3600)
    }
}

impl SettingsCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a cached value if present and not expired
    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: &str, value: Value) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CachedValue {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove a single key, returning whether it was present
    pub async fn forget(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop every entry, returning how many were removed
    pub async fn flush(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    /// Drop entries whose TTL has elapsed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_forget() {
        let cache = SettingsCache::new(60);
        cache.put("settings.section.general", json!({"a": 1})).await;

        assert_eq!(
            cache.get("settings.section.general").await,
            Some(json!({"a": 1}))
        );
        assert!(cache.forget("settings.section.general").await);
        assert!(!cache.forget("settings.section.general").await);
        assert_eq!(cache.get("settings.section.general").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_not_returned() {
        let cache = SettingsCache::new(0);
        cache.put("k", json!("v")).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_flush_reports_count() {
        let cache = SettingsCache::new(60);
        cache.put("a", json!(1)).await;
        cache.put("b", json!(2)).await;

        assert_eq!(cache.flush().await, 2);
        assert_eq!(cache.len().await, 0);
    }
}
