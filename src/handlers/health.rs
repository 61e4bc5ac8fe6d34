//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! sampling status and internal statistics.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;
use crate::status::SampleStatus;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/herakles-io/herakles-pool-cpu-exporter | More info: https://www.herakles.io | Support: proc-mem@herakles.io";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let status = state.status.read().await.clone();

    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = if status.is_updating {
        "OK - Sampling"
    } else if status.is_healthy() {
        "OK"
    } else if status.last_updated.is_none() {
        "Waiting for first CPU sample"
    } else {
        "CPU sample failed"
    };

    let table = state.health_stats.render_table();
    let sampler = render_sampler_status(&state, &status);

    debug!("Health check: {} - {}", code, message);
    (
        code,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}\n{sampler}\n{FOOTER_TEXT}"),
    )
}

fn render_sampler_status(state: &SharedState, status: &SampleStatus) -> String {
    let mut out = String::new();
    writeln!(out, "SAMPLER").ok();
    writeln!(out, "=======").ok();
    writeln!(out).ok();
    writeln!(out, "{:24} {}", "counter source:", state.cpu_stat.source_name()).ok();
    writeln!(
        out,
        "{:24} {}, {} online (from {})",
        "cpus:",
        state.topology.processor_count,
        state.topology.online_count(),
        state.topology.source
    )
    .ok();
    match status.last_updated {
        Some(at) => writeln!(out, "{:24} {}", "last sample:", at.to_rfc3339()).ok(),
        None => writeln!(out, "{:24} never", "last sample:").ok(),
    };
    writeln!(
        out,
        "{:24} {:.3}ms",
        "last sample duration:",
        status.update_duration_seconds * 1000.0
    )
    .ok();
    writeln!(
        out,
        "{:24} {}",
        "consecutive failures:", status.consecutive_failures
    )
    .ok();
    if let Some(error) = &status.last_error {
        writeln!(out, "{:24} {}", "last error:", error).ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sampler::update_sample;
    use crate::state::tests::{test_state, FIRST};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_unavailable_until_first_sample() {
        let state = test_state(&[FIRST], BTreeMap::new(), Config::default());
        let response = health_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        update_sample(&state).await.unwrap();
        let response = health_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sampler_section_shows_error() {
        let state = test_state(&[], BTreeMap::new(), Config::default());
        assert!(update_sample(&state).await.is_err());

        let status = state.status.read().await.clone();
        let text = render_sampler_status(&state, &status);
        assert!(text.contains("last sample:"));
        assert!(text.contains("never"));
        assert!(text.contains("consecutive failures:    1"));
        assert!(text.contains("last error:"));
    }
}
