use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::db::models::ProblemTemplate;
use crate::repositories;

/// Where templates come from when the cache misses.
#[async_trait]
pub(crate) trait TemplateSource: Send + Sync {
    async fn load(&self, id: i64) -> Result<Option<ProblemTemplate>, sqlx::Error>;

    async fn list_ids(&self) -> Result<Vec<i64>, sqlx::Error>;
}

pub(crate) struct PgTemplateSource {
    pool: PgPool,
}

impl PgTemplateSource {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateSource for PgTemplateSource {
    async fn load(&self, id: i64) -> Result<Option<ProblemTemplate>, sqlx::Error> {
        repositories::templates::find_by_id(&self.pool, id).await
    }

    async fn list_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        repositories::templates::list_ids(&self.pool).await
    }
}

/// In-process template cache keyed by id. Entries never expire on their own;
/// admin edits call [`TemplateCache::invalidate`] and the admin API exposes
/// [`TemplateCache::invalidate_all`].
#[derive(Clone)]
pub(crate) struct TemplateCache {
    source: Arc<dyn TemplateSource>,
    entries: Arc<RwLock<HashMap<i64, Arc<ProblemTemplate>>>>,
}

impl TemplateCache {
    pub(crate) fn new(source: Arc<dyn TemplateSource>) -> Self {
        Self { source, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub(crate) async fn get(&self, id: i64) -> Result<Option<Arc<ProblemTemplate>>, sqlx::Error> {
        if let Some(template) = self.entries.read().await.get(&id) {
            return Ok(Some(template.clone()));
        }

        let Some(template) = self.source.load(id).await? else {
            return Ok(None);
        };

        let template = Arc::new(template);
        self.entries.write().await.insert(id, template.clone());
        tracing::debug!(template_id = id, "Template cached");
        Ok(Some(template))
    }

    pub(crate) async fn list_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        self.source.list_ids().await
    }

    pub(crate) async fn invalidate(&self, id: i64) {
        self.entries.write().await.remove(&id);
    }

    /// Drops every cached template and returns how many were cached.
    pub(crate) async fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.write().await;
        let cleared = entries.len();
        entries.clear();
        tracing::info!(cleared, "Template cache cleared");
        cleared
    }

    pub(crate) async fn cached_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_template, StaticTemplateSource};

    #[tokio::test]
    async fn loads_once_then_serves_from_memory() {
        let source = Arc::new(StaticTemplateSource::new(vec![sample_template(1, "v, B, L")]));
        let cache = TemplateCache::new(source.clone());

        let first = cache.get(1).await.expect("get").expect("template");
        let second = cache.get(1).await.expect("get").expect("template");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.loads(), 1);
        assert_eq!(cache.cached_count().await, 1);
    }

    #[tokio::test]
    async fn missing_template_is_not_cached() {
        let source = Arc::new(StaticTemplateSource::new(Vec::new()));
        let cache = TemplateCache::new(source.clone());

        assert!(cache.get(99).await.expect("get").is_none());
        assert!(cache.get(99).await.expect("get").is_none());
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_reload() {
        let source = Arc::new(StaticTemplateSource::new(vec![
            sample_template(1, "v"),
            sample_template(2, "B"),
        ]));
        let cache = TemplateCache::new(source.clone());

        cache.get(1).await.expect("get");
        cache.get(2).await.expect("get");
        cache.invalidate(1).await;
        cache.get(1).await.expect("get");
        assert_eq!(source.loads(), 3);

        assert_eq!(cache.invalidate_all().await, 2);
        assert_eq!(cache.cached_count().await, 0);
        assert_eq!(cache.list_ids().await.expect("ids"), vec![1, 2]);
    }
}
