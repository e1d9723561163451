use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

use crate::services::problem_cache::{CacheError, ProblemCache};

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Fixed-window counter; allows everything while disconnected.
    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(true);
        };

        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
        "#,
        );

        let current: i64 =
            script.key(key).arg(window_seconds as i64).invoke_async(&mut manager).await?;

        Ok(current <= limit as i64)
    }

    async fn manager(&self) -> Result<ConnectionManager, CacheError> {
        self.manager.read().await.clone().ok_or(CacheError::Disconnected)
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl ProblemCache for RedisHandle {
    async fn list_len(&self, key: &str) -> Result<u64, CacheError> {
        let mut manager = self.manager().await?;
        Ok(cmd("LLEN").arg(key).query_async::<_, u64>(&mut manager).await?)
    }

    async fn list_push(&self, key: &str, value: String) -> Result<u64, CacheError> {
        let mut manager = self.manager().await?;
        Ok(cmd("LPUSH").arg(key).arg(value).query_async::<_, u64>(&mut manager).await?)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut manager = self.manager().await?;
        Ok(cmd("LPOP").arg(key).query_async::<_, Option<String>>(&mut manager).await?)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut manager = self.manager().await?;
        cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .arg(value)
            .query_async::<_, ()>(&mut manager)
            .await?;
        Ok(())
    }

    async fn get_and_refresh(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError> {
        let mut manager = self.manager().await?;
        Ok(cmd("GETEX")
            .arg(key)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async::<_, Option<String>>(&mut manager)
            .await?)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut manager = self.manager().await?;
        let removed = cmd("DEL").arg(key).query_async::<_, u64>(&mut manager).await?;
        Ok(removed > 0)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
