//! Prometheus metrics definitions for herakles-pool-cpu-exporter.
//!
//! `thread_cpu_usage` and `pool_cpu_usage` carry the utilization records;
//! the `herakles_pool_cpu_*` gauges describe the exporter itself.

use herakles_pool_cpu_exporter::publish::{PoolRecord, ProcessorRecord};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts, Registry};

pub const THREAD_CPU_USAGE: &str = "thread_cpu_usage";
pub const POOL_CPU_USAGE: &str = "pool_cpu_usage";

/// Label names of `pool_cpu_usage`, in `with_label_values` order.
pub const POOL_LABELS: &[&str] = &[
    "policy",
    "pretty_name",
    "def_name",
    "CPUs",
    "memory",
    "pool_size",
    "pod_name",
    "container_name",
];

/// Per-CPU and per-pool utilization gauges.
#[derive(Clone)]
pub struct PoolCpuMetrics {
    pub thread_cpu_usage: GaugeVec,
    pub pool_cpu_usage: GaugeVec,
}

impl PoolCpuMetrics {
    /// Creates and registers the utilization gauges with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let thread_cpu_usage = GaugeVec::new(
            Opts::new(THREAD_CPU_USAGE, "CPU usage for a given thread"),
            &["thread_id"],
        )?;
        let pool_cpu_usage = GaugeVec::new(
            Opts::new(POOL_CPU_USAGE, "CPU usage for a given pool"),
            POOL_LABELS,
        )?;

        registry.register(Box::new(thread_cpu_usage.clone()))?;
        registry.register(Box::new(pool_cpu_usage.clone()))?;

        Ok(Self {
            thread_cpu_usage,
            pool_cpu_usage,
        })
    }

    /// Drops all label sets so pools that disappeared stop being exported.
    pub fn reset(&self) {
        self.thread_cpu_usage.reset();
        self.pool_cpu_usage.reset();
    }

    pub fn set_processor(&self, record: &ProcessorRecord) {
        let thread_id = record.processor_id.to_string();
        self.thread_cpu_usage
            .with_label_values(&[thread_id.as_str()])
            .set(record.utilization_percent);
    }

    pub fn set_pool(&self, policy: &str, record: &PoolRecord) {
        let pool_size = record.processor_milli_size.to_string();
        self.pool_cpu_usage
            .with_label_values(&[
                policy,
                record.pool_name.as_str(),
                record.definition_name.as_str(),
                record.processor_set.as_str(),
                record.memory_set.as_str(),
                pool_size.as_str(),
                record.pod_names.as_str(),
                record.container_names.as_str(),
            ])
            .set(record.utilization_percent);
    }
}

/// Exporter self-telemetry.
#[derive(Clone)]
pub struct TelemetryMetrics {
    pub scrape_duration: Gauge,
    pub sample_duration: Gauge,
    pub sample_success: Gauge,
    pub sampling: Gauge,
    pub processors: Gauge,
    pub pools_exported: Gauge,
    pub pools_failed: Gauge,
}

impl TelemetryMetrics {
    /// Creates the telemetry gauges, registering them only when `register`
    /// is set.
    pub fn new(registry: &Registry, register: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let scrape_duration = Gauge::new(
            "herakles_pool_cpu_scrape_duration_seconds",
            "Time spent serving /metrics request",
        )?;
        let sample_duration = Gauge::new(
            "herakles_pool_cpu_sample_duration_seconds",
            "Time spent reading and applying the last CPU counter sample",
        )?;
        let sample_success = Gauge::new(
            "herakles_pool_cpu_sample_success",
            "Whether the last CPU counter sample was successful (1) or failed (0)",
        )?;
        let sampling = Gauge::new(
            "herakles_pool_cpu_sampling",
            "Whether a CPU counter sample is currently in progress (1) or idle (0)",
        )?;
        let processors = Gauge::new(
            "herakles_pool_cpu_processors",
            "Number of CPUs tracked by the sampler",
        )?;
        let pools_exported = Gauge::new(
            "herakles_pool_cpu_pools_exported",
            "Number of pools exported by the last scrape",
        )?;
        let pools_failed = Gauge::new(
            "herakles_pool_cpu_pools_failed",
            "Number of pools left out of the last scrape because of errors",
        )?;

        let telemetry = Self {
            scrape_duration,
            sample_duration,
            sample_success,
            sampling,
            processors,
            pools_exported,
            pools_failed,
        };

        if register {
            registry.register(Box::new(telemetry.scrape_duration.clone()))?;
            registry.register(Box::new(telemetry.sample_duration.clone()))?;
            registry.register(Box::new(telemetry.sample_success.clone()))?;
            registry.register(Box::new(telemetry.sampling.clone()))?;
            registry.register(Box::new(telemetry.processors.clone()))?;
            registry.register(Box::new(telemetry.pools_exported.clone()))?;
            registry.register(Box::new(telemetry.pools_failed.clone()))?;
        }

        Ok(telemetry)
    }
}

/// Stamps every sample of the utilization families with the time the CPU
/// counters were read.
pub fn stamp_sample_time(families: &mut [MetricFamily], timestamp_ms: i64) {
    for family in families.iter_mut() {
        let name = family.name();
        if name != THREAD_CPU_USAGE && name != POOL_CPU_USAGE {
            continue;
        }
        for metric in family.metric.iter_mut() {
            metric.set_timestamp_ms(timestamp_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn encode(registry: &Registry, timestamp_ms: Option<i64>) -> String {
        let mut families = registry.gather();
        if let Some(ts) = timestamp_ms {
            stamp_sample_time(&mut families, ts);
        }
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn pool(name: &str, utilization: f64) -> PoolRecord {
        PoolRecord {
            pool_name: name.into(),
            definition_name: "shared".into(),
            processor_set: "0-1".into(),
            memory_set: "0".into(),
            processor_milli_size: 2000,
            pod_names: "web-0".into(),
            container_names: "web-0/nginx".into(),
            utilization_percent: utilization,
        }
    }

    #[test]
    fn test_exports_records_with_labels() {
        let registry = Registry::new();
        let metrics = PoolCpuMetrics::new(&registry).unwrap();

        metrics.set_processor(&ProcessorRecord {
            processor_id: 3,
            utilization_percent: 42.5,
        });
        metrics.set_pool("podpools", &pool("shared[0]", 160.0));

        let text = encode(&registry, None);
        assert!(text.contains("thread_cpu_usage{thread_id=\"3\"} 42.5"));
        assert!(text.contains("pretty_name=\"shared[0]\""));
        assert!(text.contains("CPUs=\"0-1\""));
        assert!(text.contains("pool_size=\"2000\""));
        assert!(text.contains("policy=\"podpools\""));
        assert!(text.contains("} 160"));
    }

    #[test]
    fn test_reset_drops_stale_pools() {
        let registry = Registry::new();
        let metrics = PoolCpuMetrics::new(&registry).unwrap();
        metrics.set_pool("podpools", &pool("old[0]", 10.0));
        metrics.reset();
        metrics.set_pool("podpools", &pool("new[0]", 20.0));

        let text = encode(&registry, None);
        assert!(!text.contains("old[0]"));
        assert!(text.contains("new[0]"));
    }

    #[test]
    fn test_sample_time_only_on_utilization() {
        let registry = Registry::new();
        let metrics = PoolCpuMetrics::new(&registry).unwrap();
        let telemetry = TelemetryMetrics::new(&registry, true).unwrap();
        metrics.set_processor(&ProcessorRecord {
            processor_id: 0,
            utilization_percent: 1.0,
        });
        telemetry.processors.set(1.0);

        let text = encode(&registry, Some(1_700_000_000_000));
        assert!(text.contains("thread_cpu_usage{thread_id=\"0\"} 1 1700000000000"));
        assert!(text.contains("herakles_pool_cpu_processors 1\n"));
    }

    #[test]
    fn test_unregistered_telemetry() {
        let registry = Registry::new();
        let telemetry = TelemetryMetrics::new(&registry, false).unwrap();
        telemetry.sample_success.set(1.0);
        assert!(registry.gather().is_empty());
    }
}
