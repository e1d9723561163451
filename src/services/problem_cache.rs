use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub(crate) enum CacheError {
    #[error("cache backend is not connected")]
    Disconnected,
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),
    #[error("cached payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub(crate) trait ProblemCache: Send + Sync {
    async fn list_len(&self, key: &str) -> Result<u64, CacheError>;

    /// Pushes to the head of the list and returns the new length.
    async fn list_push(&self, key: &str, value: String) -> Result<u64, CacheError>;

    /// Pops from the head of the list, the same end `list_push` writes to.
    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration)
        -> Result<(), CacheError>;

    /// Returns the value and resets its expiry to `ttl` in one step.
    async fn get_and_refresh(&self, key: &str, ttl: Duration)
        -> Result<Option<String>, CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    fn backend(&self) -> &'static str;
}

#[derive(Debug)]
enum Entry {
    List(VecDeque<String>),
    Value { value: String, expires_at: Instant },
}

#[derive(Debug, Default)]
pub(crate) struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

fn evict_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if matches!(entries.get(key), Some(Entry::Value { expires_at, .. }) if *expires_at <= now) {
        entries.remove(key);
    }
}

/// Drops every expired value, including tokens nobody reads again.
fn sweep_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
    entries.retain(|_, entry| match entry {
        Entry::Value { expires_at, .. } => *expires_at > now,
        Entry::List(_) => true,
    });
}

#[async_trait]
impl ProblemCache for MemoryCache {
    async fn list_len(&self, key: &str) -> Result<u64, CacheError> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::List(items)) => Ok(items.len() as u64),
            Some(Entry::Value { .. }) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn list_push(&self, key: &str, value: String) -> Result<u64, CacheError> {
        let mut entries = self.entries.lock().await;
        sweep_expired(&mut entries, Instant::now());
        match entries.entry(key.to_string()).or_insert_with(|| Entry::List(VecDeque::new())) {
            Entry::List(items) => {
                items.push_front(value);
                Ok(items.len() as u64)
            }
            Entry::Value { .. } => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        let popped = match entries.get_mut(key) {
            None => return Ok(None),
            Some(Entry::List(items)) => items.pop_front(),
            Some(Entry::Value { .. }) => return Err(CacheError::WrongType(key.to_string())),
        };
        if matches!(entries.get(key), Some(Entry::List(items)) if items.is_empty()) {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        sweep_expired(&mut entries, now);
        entries.insert(key.to_string(), Entry::Value { value, expires_at: now + ttl });
        Ok(())
    }

    async fn get_and_refresh(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        evict_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            None => Ok(None),
            Some(Entry::Value { value, expires_at }) => {
                *expires_at = now + ttl;
                Ok(Some(value.clone()))
            }
            Some(Entry::List(_)) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        evict_expired(&mut entries, key, now);
        Ok(entries.remove(key).is_some())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_last_in_first_out() {
        let cache = MemoryCache::new();
        assert_eq!(cache.list_push("pool", "a".to_string()).await.unwrap(), 1);
        assert_eq!(cache.list_push("pool", "b".to_string()).await.unwrap(), 2);

        assert_eq!(cache.list_len("pool").await.unwrap(), 2);
        assert_eq!(cache.list_pop("pool").await.unwrap().as_deref(), Some("b"));
        assert_eq!(cache.list_pop("pool").await.unwrap().as_deref(), Some("a"));
        assert_eq!(cache.list_pop("pool").await.unwrap(), None);
        assert_eq!(cache.list_len("pool").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire_unless_refreshed() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(10);
        cache.set_with_expiry("token", "payload".to_string(), ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(
            cache.get_and_refresh("token", ttl).await.unwrap().as_deref(),
            Some("payload")
        );

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.get_and_refresh("token", ttl).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get_and_refresh("token", ttl).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_tokens_are_swept_on_write() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(900);
        for index in 0..1000 {
            let key = format!("token:{index}");
            cache.set_with_expiry(&key, "payload".to_string(), ttl).await.unwrap();
        }
        assert_eq!(cache.entries.lock().await.len(), 1000);

        tokio::time::advance(Duration::from_secs(10_000)).await;
        cache.set_with_expiry("token:fresh", "payload".to_string(), ttl).await.unwrap();
        cache.list_push("pool", "a".to_string()).await.unwrap();

        let entries = cache.entries.lock().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("token:fresh"));
        assert!(entries.contains_key("pool"));
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let cache = MemoryCache::new();
        cache.list_push("pool", "a".to_string()).await.unwrap();
        assert!(matches!(
            cache.get_and_refresh("pool", Duration::from_secs(1)).await,
            Err(CacheError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let cache = MemoryCache::new();
        cache.set_with_expiry("k", "v".to_string(), Duration::from_secs(5)).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }
}
