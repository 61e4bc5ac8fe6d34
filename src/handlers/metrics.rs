//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler that turns the
//! latest CPU sample into `thread_cpu_usage` and `pool_cpu_usage` gauges.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use herakles_pool_cpu_exporter::publish;
use prometheus::{Encoder, TextEncoder};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::metrics::stamp_sample_time;
use crate::sampler::update_sample;
use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
    SampleUnavailable(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        match self {
            MetricsError::EncodingFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response(),
            MetricsError::SampleUnavailable(reason) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("CPU sample unavailable: {reason}"),
            )
                .into_response(),
        }
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    let result = scrape(&state, start).await;
    if result.is_err() {
        state.health_stats.record_failed_scrape();
    }
    result
}

async fn scrape(state: &SharedState, start: Instant) -> Result<String, MetricsError> {
    let _scrape = state.scrape_lock.lock().await;

    if state.config.sample_on_scrape.unwrap_or(false) {
        if let Err(e) = update_sample(state).await {
            error!("On-scrape CPU sample failed: {:#}", e);
            return Err(MetricsError::SampleUnavailable(format!("{:#}", e)));
        }
    }

    {
        let status = state.status.read().await;
        if status.last_updated.is_none() {
            let reason = status
                .last_error
                .clone()
                .unwrap_or_else(|| "no sample taken yet".to_string());
            return Err(MetricsError::SampleUnavailable(reason));
        }
    }

    let pools = match state.pool_source.pools() {
        Ok(pools) => pools,
        Err(e) => {
            error!("Failed to load pool state: {}", e);
            BTreeMap::new()
        }
    };

    let publication = state
        .cpu_stat
        .with_snapshot(|snapshot| publish(snapshot, &pools))
        .map_err(|e| MetricsError::SampleUnavailable(e.to_string()))?;

    let cfg = &state.config;
    let policy = cfg.policy_name();

    state.metrics.reset();
    if cfg.enable_thread_metrics.unwrap_or(true) {
        for record in &publication.processors {
            state.metrics.set_processor(record);
        }
    }
    if cfg.enable_pool_metrics.unwrap_or(true) {
        for record in &publication.pools {
            state.metrics.set_pool(policy, record);
        }
    }

    state
        .telemetry
        .pools_exported
        .set(publication.pools.len() as f64);
    state
        .telemetry
        .pools_failed
        .set(publication.failed.len() as f64);
    state
        .telemetry
        .scrape_duration
        .set(start.elapsed().as_secs_f64());

    let mut families = state.registry.gather();
    match publication.sampled_at {
        Some(sampled_at) => stamp_sample_time(&mut families, sampled_at.timestamp_millis()),
        None => warn!("Latest CPU state carries no sample time"),
    }

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    let duration = start.elapsed().as_secs_f64();
    state.health_stats.record_scrape(
        duration,
        publication.pools.len(),
        publication.failed.len(),
    );

    debug!(
        "Metrics request completed: {} CPUs, {} pools ({} failed), {} bytes, {:.3}ms",
        publication.processors.len(),
        publication.pools.len(),
        publication.failed.len(),
        buffer.len(),
        duration * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
