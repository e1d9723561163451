use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::services::problem_cache::{CacheError, ProblemCache};
use crate::services::problem_generator::ProblemInstance;

/// Opaque token → issued instance, with a sliding expiry.
#[derive(Clone)]
pub(crate) struct TokenStore {
    cache: Arc<dyn ProblemCache>,
    prefix: String,
    ttl: Duration,
}

impl TokenStore {
    pub(crate) fn new(cache: Arc<dyn ProblemCache>, prefix: &str, ttl: Duration) -> Self {
        Self { cache, prefix: prefix.to_string(), ttl }
    }

    fn key(&self, token: &str) -> String {
        format!("{}:problem:{token}", self.prefix)
    }

    pub(crate) fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) async fn issue(&self, instance: &ProblemInstance) -> Result<String, CacheError> {
        let token = Uuid::new_v4().simple().to_string();
        let payload = serde_json::to_string(instance)?;
        self.cache.set_with_expiry(&self.key(&token), payload, self.ttl).await?;
        Ok(token)
    }

    /// Returns the instance and restarts its expiry. An empty token or a
    /// record that no longer decodes reads as absent.
    pub(crate) async fn read(&self, token: &str) -> Result<Option<ProblemInstance>, CacheError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        let Some(raw) = self.cache.get_and_refresh(&self.key(token), self.ttl).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ProblemInstance>(&raw) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) => {
                tracing::warn!(error = %err, "Discarding undecodable problem token record");
                Ok(None)
            }
        }
    }

    pub(crate) async fn revoke(&self, token: &str) -> Result<(), CacheError> {
        if token.trim().is_empty() {
            return Ok(());
        }
        self.cache.delete(&self.key(token.trim())).await?;
        Ok(())
    }
}
