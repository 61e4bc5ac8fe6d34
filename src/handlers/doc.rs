//! Documentation endpoint handler.
//!
//! This module provides the `/doc` endpoint handler that displays
//! documentation for the exporter.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::config::DEFAULT_PORT;
use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /doc endpoint.
#[instrument(skip(state))]
pub async fn doc_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /doc request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");
    let built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown");
    let port = state.config.port.unwrap_or(DEFAULT_PORT);
    let doc = format!(
        r#"HERAKLES POOL CPU EXPORTER - DOCUMENTATION
==========================================

VERSION: {version} ({git_sha}, built {built})
DESCRIPTION: Prometheus exporter for per-CPU and per-pool CPU utilization

HTTP ENDPOINTS
--------------
GET /metrics     - Prometheus metrics endpoint
GET /health      - Health check with sampling statistics (plain text)
GET /pools       - Pools with their CPUs and latest utilization (plain text)
GET /doc         - This documentation (plain text)

AVAILABLE METRICS
-----------------
thread_cpu_usage{{thread_id}}
    Utilization of one CPU in percent over the last sampling interval.

pool_cpu_usage{{policy, pretty_name, def_name, CPUs, memory, pool_size, pod_name, container_name}}
    Utilization of a pool: (1 - idle/total) * 100 * number of CPUs in the
    pool, computed over the summed deltas of the pool's CPUs. A fully busy
    pool of 4 CPUs reports 400.

herakles_pool_cpu_*
    Exporter telemetry: scrape and sample durations, sample success,
    sampling in progress, CPU count, exported and failed pools.

Both utilization families carry the time of the underlying CPU sample.

SAMPLING
--------
The CPU time counters are read every sample_interval_secs seconds. The
first sample only establishes a baseline, so utilization reads 0 until
the second one. A read that takes longer than sample_timeout_ms fails
that interval; the previous values stay exported.

POOL DEFINITIONS
----------------
pools_file points to a YAML/JSON/TOML file with `pools`, `pods` and
`containers` lists. It is re-read on every scrape.

CONFIGURATION
-------------
Config file locations (in order):
1. CLI specified: -c /path/to/config.yaml
2. System config: /etc/herakles/pool-cpu-exporter.yaml
3. Current directory: ./herakles-pool-cpu-exporter.yaml

Key configuration options:
- port: HTTP listen port (default: 9216)
- bind: Bind address (default: 0.0.0.0)
- stat_path: CPU time counter source (default: /proc/stat)
- pools_file: Pool definitions file (default: none)
- policy_name: Value of the policy label (default: podpools)
- sample_interval_secs: Seconds between samples (default: 5)
- sample_timeout_ms: Sample read timeout (default: 2000)
- sample_on_scrape: Sample on every scrape instead of periodically (default: false)

TLS/SSL Configuration:
- enable_tls: Enable HTTPS (default: false)
- tls_cert_path: Path to TLS certificate (PEM format)
- tls_key_path: Path to TLS private key (PEM format)

CLI COMMANDS
------------
herakles-pool-cpu-exporter                    - Start the exporter
herakles-pool-cpu-exporter check --all        - Validate system requirements
herakles-pool-cpu-exporter config -o config.yaml - Generate config file
herakles-pool-cpu-exporter test               - Sample and print utilization
herakles-pool-cpu-exporter pools -v           - List pools from the pools file
herakles-pool-cpu-exporter --help             - Show all CLI options

EXAMPLE PROMQL QUERIES
----------------------
# Busiest CPUs
topk(5, thread_cpu_usage)

# Average utilization across all CPUs
avg(thread_cpu_usage)

# Utilization per pool definition
sum by (def_name) (pool_cpu_usage)

PROMETHEUS SCRAPE CONFIG
------------------------
scrape_configs:
  - job_name: 'herakles-pool-cpu'
    static_configs:
      - targets: ['localhost:{port}']
    scrape_interval: 15s

{FOOTER_TEXT}
"#
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
