pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::services::problem_cache::{MemoryCache, ProblemCache};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let (state, redis) = build_state(settings).await?;

    if let Err(err) = core::bootstrap::ensure_superuser(state.settings(), state.db()).await {
        tracing::error!(error = %err, "Failed to ensure default superuser");
    }

    if state.settings().problem_pool().prewarm_on_startup {
        match state.pool().prewarm().await {
            Ok(report) => tracing::info!(
                templates = report.templates,
                generated = report.generated,
                "Startup prewarm finished"
            ),
            Err(err) => tracing::error!(error = %err, "Startup prewarm failed"),
        }
    }

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        cache = state.pool().cache_backend(),
        "Physics exam API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

/// Fills every template pool up to its target size and exits.
pub async fn run_prewarm() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;

    let (state, redis) = build_state(settings).await?;
    if state.pool().cache_backend() != "redis" {
        tracing::warn!("Redis unavailable; prewarmed pools will not outlive this process");
    }

    let report = state.pool().prewarm().await;
    redis.disconnect().await;
    let report = report?;

    for pool in &report.pools {
        tracing::info!(template_id = pool.template_id, size = pool.size, "Pool ready");
    }
    tracing::info!(
        templates = report.templates,
        generated = report.generated,
        "Prewarm finished"
    );

    Ok(())
}

async fn build_state(settings: Settings) -> anyhow::Result<(AppState, RedisHandle)> {
    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    let cache: Arc<dyn ProblemCache> = match redis.connect().await {
        Ok(()) => {
            tracing::info!("Redis connected successfully");
            Arc::new(redis.clone())
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                "Failed to connect to Redis; problem pools fall back to process memory"
            );
            Arc::new(MemoryCache::new())
        }
    };

    Ok((AppState::new(settings, db_pool, redis.clone(), cache), redis))
}
