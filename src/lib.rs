//! Per-CPU and per-pool CPU utilization sampling.
//!
//! The library holds the sampling engine used by the exporter binary:
//!
//! - [`cpuset`]: expands compact cpusets (`"0,2-4,7"`) into CPU ids
//! - [`procstat`]: samples `/proc/stat` and keeps per-CPU deltas
//! - [`pool`]: rolls CPU deltas up into a pool utilization figure
//! - [`publish`]: turns a state snapshot into immutable export records
//! - [`pools`]: loads pool membership from a definitions file

pub mod cpuset;
pub mod pool;
pub mod pools;
pub mod procstat;
pub mod publish;

pub use cpuset::{expand, parse_cpu_ids, CpusetError};
pub use pool::{aggregate, PoolDescriptor, PoolError};
pub use pools::{PoolFile, PoolSource, PoolSourceError};
pub use procstat::{CounterSource, CpuTimeStat, ProcStatSource, ProcessorTimeState, SampleError};
pub use publish::{publish, PoolRecord, ProcessorRecord, Publication};
