//! Immutable per-CPU and per-pool utilization records.
//!
//! The records are what the exporter turns into `thread_cpu_usage` and
//! `pool_cpu_usage` gauges; they carry no behavior of their own.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::cpuset;
use crate::pool::{self, PoolDescriptor, PoolError};
use crate::procstat::ProcessorTimeState;

/// Utilization of one CPU.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorRecord {
    pub processor_id: usize,
    pub utilization_percent: f64,
}

/// Utilization of one pool together with its descriptive labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolRecord {
    pub pool_name: String,
    pub definition_name: String,
    pub processor_set: String,
    pub memory_set: String,
    /// CPUs in the pool times 1000.
    pub processor_milli_size: u64,
    pub pod_names: String,
    pub container_names: String,
    pub utilization_percent: f64,
}

/// A pool left out of a publication because its utilization could not be
/// computed.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolFailure {
    pub pool_name: String,
    pub error: PoolError,
}

/// Everything exported for one scrape.
#[derive(Debug, Clone, Default)]
pub struct Publication {
    pub sampled_at: Option<DateTime<Utc>>,
    pub processors: Vec<ProcessorRecord>,
    pub pools: Vec<PoolRecord>,
    pub failed: Vec<PoolFailure>,
}

/// Builds the records for the current state and pool table.
///
/// Pools are emitted in name order. A pool whose cpuset is invalid or
/// outside the topology is reported in `failed` and does not affect the
/// other pools. An empty pool table yields CPU records only.
pub fn publish(state: &ProcessorTimeState, pools: &BTreeMap<String, PoolDescriptor>) -> Publication {
    let processors = processor_records(state);

    if pools.is_empty() {
        warn!("No pool state available; exporting per-CPU utilization only");
    }

    let mut records = Vec::with_capacity(pools.len());
    let mut failed = Vec::new();
    for (pool_name, descriptor) in pools {
        match pool_record(pool_name, descriptor, state) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!("Skipping pool {}: {}", pool_name, error);
                failed.push(PoolFailure {
                    pool_name: pool_name.clone(),
                    error,
                });
            }
        }
    }

    Publication {
        sampled_at: state.sampled_at(),
        processors,
        pools: records,
        failed,
    }
}

/// One record per CPU, in CPU id order.
pub fn processor_records(state: &ProcessorTimeState) -> Vec<ProcessorRecord> {
    state
        .utilization()
        .iter()
        .enumerate()
        .map(|(processor_id, utilization)| ProcessorRecord {
            processor_id,
            utilization_percent: *utilization,
        })
        .collect()
}

fn pool_record(
    pool_name: &str,
    descriptor: &PoolDescriptor,
    state: &ProcessorTimeState,
) -> Result<PoolRecord, PoolError> {
    let utilization_percent = pool::aggregate(&descriptor.processor_set, state)?;
    let cpus = cpuset::parse_cpu_ids(&descriptor.processor_set)?;

    Ok(PoolRecord {
        pool_name: pool_name.to_string(),
        definition_name: descriptor.definition_name.clone(),
        processor_set: descriptor.processor_set.clone(),
        memory_set: descriptor.memory_set.clone(),
        processor_milli_size: cpus.len() as u64 * 1000,
        pod_names: descriptor.pod_names.clone(),
        container_names: descriptor.container_names.clone(),
        utilization_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::tests::state_with_deltas;

    fn descriptor(name: &str, cpus: &str) -> PoolDescriptor {
        PoolDescriptor {
            pool_name: name.into(),
            definition_name: name.split('[').next().unwrap_or(name).into(),
            processor_set: cpus.into(),
            memory_set: "0".into(),
            container_names: "web-0/nginx".into(),
            pod_names: "web-0".into(),
        }
    }

    #[test]
    fn test_publish_processors_and_pools() {
        let state = state_with_deltas(&[10, 30, 100, 50], &[100, 100, 100, 100]);
        let mut pools = BTreeMap::new();
        pools.insert("shared[0]".to_string(), descriptor("shared[0]", "0-1"));
        pools.insert("batch[0]".to_string(), descriptor("batch[0]", "2,3"));

        let publication = publish(&state, &pools);

        assert_eq!(publication.processors.len(), 4);
        assert_eq!(publication.processors[2].processor_id, 2);
        assert_eq!(publication.processors[2].utilization_percent, 0.0);
        assert!((publication.processors[0].utilization_percent - 90.0).abs() < 1e-9);

        let names: Vec<_> = publication.pools.iter().map(|p| p.pool_name.as_str()).collect();
        assert_eq!(names, vec!["batch[0]", "shared[0]"]);

        let shared = &publication.pools[1];
        assert!((shared.utilization_percent - 160.0).abs() < 1e-9);
        assert_eq!(shared.processor_milli_size, 2000);
        assert_eq!(shared.definition_name, "shared");
        assert_eq!(shared.memory_set, "0");
        assert_eq!(shared.pod_names, "web-0");
        assert_eq!(shared.container_names, "web-0/nginx");

        assert!(publication.failed.is_empty());
        assert_eq!(publication.sampled_at, state.sampled_at());
    }

    #[test]
    fn test_publish_isolates_broken_pools() {
        let state = state_with_deltas(&[0; 8], &[100; 8]);
        let mut pools = BTreeMap::new();
        pools.insert("good".to_string(), descriptor("good", "0-7"));
        pools.insert("huge".to_string(), descriptor("huge", "99"));
        pools.insert("typo".to_string(), descriptor("typo", "0-x"));

        let publication = publish(&state, &pools);

        assert_eq!(publication.pools.len(), 1);
        assert_eq!(publication.pools[0].pool_name, "good");
        assert!((publication.pools[0].utilization_percent - 800.0).abs() < 1e-9);

        assert_eq!(publication.failed.len(), 2);
        assert_eq!(publication.failed[0].pool_name, "huge");
        assert!(matches!(
            publication.failed[0].error,
            PoolError::ProcessorOutOfRange { cpu: 99, .. }
        ));
        assert!(matches!(
            publication.failed[1].error,
            PoolError::InvalidCpuset(_)
        ));
    }

    #[test]
    fn test_publish_without_pools() {
        let state = state_with_deltas(&[5, 5], &[10, 10]);
        let publication = publish(&state, &BTreeMap::new());
        assert_eq!(publication.processors.len(), 2);
        assert!(publication.pools.is_empty());
        assert!(publication.failed.is_empty());
    }
}
