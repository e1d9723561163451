use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::models::ProblemTemplate;
use crate::services::problem_cache::{CacheError, ProblemCache};
use crate::services::problem_generator::{ProblemGenerator, ProblemInstance};
use crate::services::problem_tokens::TokenStore;
use crate::services::template_cache::TemplateCache;

#[derive(Debug, Error)]
pub(crate) enum PoolError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    pub(crate) prefix: String,
    pub(crate) target_size: u64,
    pub(crate) low_water: u64,
    pub(crate) refill_batch: u64,
}

impl PoolConfig {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let pool = settings.problem_pool();
        Self {
            prefix: pool.cache_prefix.clone(),
            target_size: pool.target_size,
            low_water: pool.low_water,
            refill_batch: pool.refill_batch,
        }
    }
}

/// A problem handed to a student together with the token that binds it.
#[derive(Debug, Clone)]
pub(crate) struct IssuedProblem {
    pub(crate) token: String,
    pub(crate) instance: ProblemInstance,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PoolStatus {
    pub(crate) template_id: i64,
    pub(crate) size: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct PrewarmReport {
    pub(crate) templates: usize,
    pub(crate) generated: usize,
    pub(crate) pools: Vec<PoolStatus>,
}

#[derive(Clone)]
pub(crate) struct ProblemPool {
    cache: Arc<dyn ProblemCache>,
    templates: TemplateCache,
    tokens: TokenStore,
    generator: Arc<ProblemGenerator>,
    config: PoolConfig,
}

impl ProblemPool {
    pub(crate) fn new(
        cache: Arc<dyn ProblemCache>,
        templates: TemplateCache,
        tokens: TokenStore,
        generator: Arc<ProblemGenerator>,
        config: PoolConfig,
    ) -> Self {
        Self { cache, templates, tokens, generator, config }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub(crate) fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    pub(crate) fn cache_backend(&self) -> &'static str {
        self.cache.backend()
    }

    fn key(&self, template_id: i64) -> String {
        format!("{}:pool:{template_id}", self.config.prefix)
    }

    /// Refills the pool when it has dropped below the low-water mark.
    /// Returns the number of instances pushed.
    pub(crate) async fn ensure_pool(&self, template_id: i64) -> Result<usize, PoolError> {
        let Some(template) = self.templates.get(template_id).await? else {
            return Ok(0);
        };
        self.ensure_loaded(&template).await
    }

    async fn ensure_loaded(&self, template: &ProblemTemplate) -> Result<usize, PoolError> {
        let size = self.cache.list_len(&self.key(template.id)).await?;
        if size >= self.config.low_water {
            return Ok(0);
        }
        tracing::debug!(
            template_id = template.id,
            size,
            low_water = self.config.low_water,
            "Pool below low-water mark"
        );
        self.refill(template, self.config.refill_batch as usize).await
    }

    /// Generates `count` instances and pushes them. Instances that fail to
    /// serialize are skipped, so a partial batch still lands.
    async fn refill(&self, template: &ProblemTemplate, count: usize) -> Result<usize, PoolError> {
        if count == 0 {
            return Ok(0);
        }

        let payloads: Vec<String> = self
            .generate_batch(template, count)
            .into_iter()
            .filter_map(|instance| match serde_json::to_string(&instance) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    tracing::warn!(
                        template_id = template.id,
                        error = %err,
                        "Skipping instance that failed to serialize"
                    );
                    None
                }
            })
            .collect();

        let key = self.key(template.id);
        let mut pushed = 0;
        for payload in payloads {
            self.cache.list_push(&key, payload).await?;
            pushed += 1;
        }

        metrics::counter!("problem_pool_refills_total", "template_id" => template.id.to_string())
            .increment(1);
        metrics::counter!(
            "problem_pool_generated_total",
            "template_id" => template.id.to_string()
        )
        .increment(pushed as u64);
        tracing::info!(template_id = template.id, pushed, "Pool refilled");
        Ok(pushed)
    }

    fn generate_batch(&self, template: &ProblemTemplate, count: usize) -> Vec<ProblemInstance> {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| self.generator.generate(template, &mut rng)).collect()
    }

    fn generate_one(&self, template: &ProblemTemplate) -> ProblemInstance {
        let mut rng = rand::thread_rng();
        self.generator.generate(template, &mut rng)
    }

    /// Takes an instance from the pool (generating directly when the pool is
    /// empty or the entry is corrupt) and issues a token for it. `None` means
    /// the template does not exist.
    pub(crate) async fn fetch(&self, template_id: i64) -> Result<Option<IssuedProblem>, PoolError> {
        let Some(template) = self.templates.get(template_id).await? else {
            return Ok(None);
        };

        self.ensure_loaded(&template).await?;

        let instance = match self.cache.list_pop(&self.key(template_id)).await? {
            Some(raw) => match serde_json::from_str::<ProblemInstance>(&raw) {
                Ok(instance) => {
                    metrics::counter!(
                        "problem_pool_hits_total",
                        "template_id" => template_id.to_string()
                    )
                    .increment(1);
                    instance
                }
                Err(err) => {
                    tracing::warn!(
                        template_id,
                        error = %err,
                        "Corrupt pool entry; generating directly"
                    );
                    self.generate_one(&template)
                }
            },
            None => {
                metrics::counter!(
                    "problem_pool_misses_total",
                    "template_id" => template_id.to_string()
                )
                .increment(1);
                self.generate_one(&template)
            }
        };

        let token = self.tokens.issue(&instance).await?;
        Ok(Some(IssuedProblem { token, instance }))
    }

    /// Returns the instance behind `token` when it is still live and belongs
    /// to `template_id`, otherwise fetches a new one.
    pub(crate) async fn resume_or_fetch(
        &self,
        template_id: i64,
        token: Option<&str>,
    ) -> Result<Option<IssuedProblem>, PoolError> {
        if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
            if let Some(instance) = self.tokens.read(token).await? {
                if instance.template_id == template_id {
                    return Ok(Some(IssuedProblem { token: token.trim().to_string(), instance }));
                }
            }
        }
        self.fetch(template_id).await
    }

    /// Generates an instance without pooling or issuing a token.
    pub(crate) async fn preview(
        &self,
        template_id: i64,
    ) -> Result<Option<ProblemInstance>, PoolError> {
        let Some(template) = self.templates.get(template_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.generate_one(&template)))
    }

    /// Tops every template's pool up to the target size.
    pub(crate) async fn prewarm(&self) -> Result<PrewarmReport, PoolError> {
        let mut report = PrewarmReport::default();

        for template_id in self.templates.list_ids().await? {
            let Some(template) = self.templates.get(template_id).await? else {
                continue;
            };
            report.templates += 1;

            let size = self.cache.list_len(&self.key(template_id)).await?;
            let missing = self.config.target_size.saturating_sub(size) as usize;
            let pushed = self.refill(&template, missing).await?;
            report.generated += pushed;
            report.pools.push(PoolStatus { template_id, size: size + pushed as u64 });
        }

        tracing::info!(
            templates = report.templates,
            generated = report.generated,
            "Problem pools prewarmed"
        );
        Ok(report)
    }

    pub(crate) async fn clear(&self, template_id: i64) -> Result<bool, PoolError> {
        Ok(self.cache.delete(&self.key(template_id)).await?)
    }

    pub(crate) async fn pool_size(&self, template_id: i64) -> Result<u64, PoolError> {
        Ok(self.cache.list_len(&self.key(template_id)).await?)
    }

    pub(crate) async fn status(&self) -> Result<Vec<PoolStatus>, PoolError> {
        let mut pools = Vec::new();
        for template_id in self.templates.list_ids().await? {
            pools.push(PoolStatus { template_id, size: self.pool_size(template_id).await? });
        }
        Ok(pools)
    }
}
