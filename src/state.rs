//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the background sampling task.

use herakles_pool_cpu_exporter::{CpuTimeStat, PoolSource};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::health_stats::HealthStats;
use crate::metrics::{PoolCpuMetrics, TelemetryMetrics};
use crate::status::SampleStatus;
use crate::system::Topology;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: PoolCpuMetrics,
    pub telemetry: TelemetryMetrics,
    pub cpu_stat: Arc<CpuTimeStat>,
    pub pool_source: Arc<dyn PoolSource>,
    pub status: Arc<RwLock<SampleStatus>>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    pub topology: Topology,
    /// Serializes scrapes: the gauges are reset and refilled per scrape.
    pub scrape_lock: Mutex<()>,
}

impl AppState {
    /// Builds the state and registers the metric families with a fresh
    /// registry.
    pub fn new(
        config: Config,
        cpu_stat: Arc<CpuTimeStat>,
        pool_source: Arc<dyn PoolSource>,
        topology: Topology,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();
        let metrics = PoolCpuMetrics::new(&registry)?;
        let telemetry = TelemetryMetrics::new(&registry, config.enable_telemetry.unwrap_or(true))?;
        telemetry.processors.set(topology.processor_count as f64);

        Ok(Self {
            registry,
            metrics,
            telemetry,
            cpu_stat,
            pool_source,
            status: Arc::new(RwLock::new(SampleStatus::default())),
            config: Arc::new(config),
            health_stats: Arc::new(HealthStats::new()),
            topology,
            scrape_lock: Mutex::new(()),
        })
    }
}
