use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

fn describe() {
    describe_counter!("http_requests_total", "HTTP requests by response status");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency"
    );
    describe_counter!("problem_pool_hits_total", "Fetches served from a pre-generated pool");
    describe_counter!("problem_pool_misses_total", "Fetches that found the pool empty");
    describe_counter!("problem_pool_refills_total", "Pool refill batches");
    describe_counter!("problem_pool_generated_total", "Instances pushed into pools");
    describe_counter!(
        "problem_generation_fallbacks_total",
        "Generations that gave up on plausibility and used the fallback range"
    );
    describe_counter!("submissions_total", "Graded answer submissions");
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
