//! Pool-level CPU utilization.
//!
//! A pool's utilization is computed from the summed idle/total deltas of its
//! CPUs and then scaled by the number of CPUs in the pool:
//!
//! ```text
//! (1 - sum(delta_idle) / sum(delta_total)) * 100 * cpus_in_pool
//! ```
//!
//! The result is "busy CPUs times 100", not a 0-100 average: a fully busy
//! 4-CPU pool reports 400. It equals the sum of per-CPU utilizations only
//! when every CPU in the pool saw the same number of total ticks during the
//! interval, which holds for the kernel's synchronous tick accounting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpuset::{self, CpusetError};
use crate::procstat::ProcessorTimeState;

/// Errors scoped to a single pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("invalid pool cpuset: {0}")]
    InvalidCpuset(#[from] CpusetError),

    #[error("pool references cpu{cpu}, but only {processor_count} CPUs are known")]
    ProcessorOutOfRange { cpu: usize, processor_count: usize },
}

/// A pool as supplied by the pool bookkeeping.
///
/// Everything except `processor_set` is passed through to the exported
/// labels untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub pool_name: String,
    pub definition_name: String,
    pub processor_set: String,
    pub memory_set: String,
    pub container_names: String,
    pub pod_names: String,
}

/// Computes the utilization of the pool covering `pool_processor_spec`.
///
/// Every CPU id is validated against the state's topology. A pool with no
/// elapsed ticks (including an empty cpuset) reports 0.
pub fn aggregate(pool_processor_spec: &str, state: &ProcessorTimeState) -> Result<f64, PoolError> {
    let cpus = cpuset::parse_cpu_ids(pool_processor_spec)?;
    let processor_count = state.processor_count();
    let delta_idle = state.delta_idle();
    let delta_total = state.delta_total();

    let mut pool_idle = 0u64;
    let mut pool_total = 0u64;
    for &cpu in &cpus {
        if cpu >= processor_count {
            return Err(PoolError::ProcessorOutOfRange {
                cpu,
                processor_count,
            });
        }
        pool_idle = pool_idle.saturating_add(delta_idle[cpu]);
        pool_total = pool_total.saturating_add(delta_total[cpu]);
    }

    if pool_total == 0 {
        return Ok(0.0);
    }

    Ok((1.0 - pool_idle as f64 / pool_total as f64) * 100.0 * cpus.len() as f64)
}
