use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::problem_cache::ProblemCache;
use crate::services::problem_generator::ProblemGenerator;
use crate::services::problem_pool::{PoolConfig, ProblemPool};
use crate::services::problem_tokens::TokenStore;
use crate::services::range_rules::RangeRules;
use crate::services::submission::{PgResponseLedger, ResponseLedger};
use crate::services::template_cache::{PgTemplateSource, TemplateCache};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    pool: ProblemPool,
    ledger: Arc<dyn ResponseLedger>,
}

impl AppState {
    /// Wires the Postgres-backed template source and response ledger
    /// around the given problem cache.
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        cache: Arc<dyn ProblemCache>,
    ) -> Self {
        let templates = TemplateCache::new(Arc::new(PgTemplateSource::new(db.clone())));
        let pool = build_pool(&settings, cache, templates);
        let ledger = Arc::new(PgResponseLedger::new(db.clone()));
        Self::from_parts(settings, db, redis, pool, ledger)
    }

    pub(crate) fn from_parts(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        pool: ProblemPool,
        ledger: Arc<dyn ResponseLedger>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, pool, ledger }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn pool(&self) -> &ProblemPool {
        &self.inner.pool
    }

    pub(crate) fn templates(&self) -> &TemplateCache {
        self.inner.pool.templates()
    }

    pub(crate) fn ledger(&self) -> &dyn ResponseLedger {
        self.inner.ledger.as_ref()
    }
}

pub(crate) fn build_pool(
    settings: &Settings,
    cache: Arc<dyn ProblemCache>,
    templates: TemplateCache,
) -> ProblemPool {
    let pool_settings = settings.problem_pool();
    let tokens = TokenStore::new(cache.clone(), &pool_settings.cache_prefix, pool_settings.ttl());
    let generator =
        Arc::new(ProblemGenerator::new(RangeRules::default(), settings.generator().max_attempts));
    ProblemPool::new(cache, templates, tokens, generator, PoolConfig::from_settings(settings))
}
