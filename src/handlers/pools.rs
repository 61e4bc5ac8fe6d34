//! Pools endpoint handler.
//!
//! Renders the pools currently known to the pool source together with
//! their expanded CPUs and latest utilization.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use herakles_pool_cpu_exporter::{aggregate, expand, PoolDescriptor};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument, warn};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /pools endpoint.
#[instrument(skip(state))]
pub async fn pools_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /pools request");
    state.health_stats.record_http_request();

    let body = match state.pool_source.pools() {
        Ok(pools) => render_pools(&pools, &pool_utilization(&state, &pools)),
        Err(e) => {
            warn!("Failed to load pool state: {}", e);
            format!("Failed to load pool state: {e}\n")
        }
    };

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{body}\n{FOOTER_TEXT}"),
    )
}

/// Latest utilization per pool; empty if the CPU state cannot be read.
fn pool_utilization(
    state: &SharedState,
    pools: &BTreeMap<String, PoolDescriptor>,
) -> BTreeMap<String, Result<f64, String>> {
    state
        .cpu_stat
        .with_snapshot(|snapshot| {
            pools
                .iter()
                .map(|(name, spec)| {
                    let value =
                        aggregate(&spec.processor_set, snapshot).map_err(|e| e.to_string());
                    (name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn render_pools(
    pools: &BTreeMap<String, PoolDescriptor>,
    utilization: &BTreeMap<String, Result<f64, String>>,
) -> String {
    let mut out = String::new();
    writeln!(out, "POOLS").ok();
    writeln!(out, "=====").ok();
    writeln!(out).ok();

    if pools.is_empty() {
        writeln!(out, "No pools defined").ok();
        return out;
    }

    for (name, spec) in pools {
        writeln!(out, "{} (definition: {})", name, spec.definition_name).ok();
        let cpus = match expand(&spec.processor_set) {
            Ok(ids) => format!("{} [{}]", spec.processor_set, ids.len()),
            Err(e) => format!("{} (invalid: {})", spec.processor_set, e),
        };
        writeln!(out, "  cpus:       {}", cpus).ok();
        writeln!(out, "  mems:       {}", spec.memory_set).ok();
        writeln!(out, "  pods:       {}", spec.pod_names).ok();
        writeln!(out, "  containers: {}", spec.container_names).ok();
        match utilization.get(name) {
            Some(Ok(value)) => writeln!(out, "  usage:      {:.2}%", value).ok(),
            Some(Err(e)) => writeln!(out, "  usage:      unavailable ({})", e).ok(),
            None => writeln!(out, "  usage:      unavailable").ok(),
        };
        writeln!(out).ok();
    }

    writeln!(out, "Total: {} pools", pools.len()).ok();
    out
}
