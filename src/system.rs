//! CPU topology discovery.
//!
//! The sampler's state is sized once at startup from the highest CPU id
//! found here. Only the online ids are expected in every counter table.

use herakles_pool_cpu_exporter::{cpuset, procstat};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// How the processor count was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologySource {
    OnlineList,
    CounterRows,
    Sysconf,
}

impl std::fmt::Display for TopologySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologySource::OnlineList => write!(f, "online CPU list"),
            TopologySource::CounterRows => write!(f, "counter source rows"),
            TopologySource::Sysconf => write!(f, "sysconf"),
        }
    }
}

/// Discovered CPU topology.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Highest CPU id plus one.
    pub processor_count: usize,
    /// Sorted ids of the CPUs that were online at discovery.
    pub online: Vec<usize>,
    pub source: TopologySource,
}

impl Topology {
    /// Builds a topology from a set of online ids.
    ///
    /// CPU ids index the sampler state directly, so offline holes below the
    /// highest id keep their slot.
    pub fn from_online(mut online: Vec<usize>, source: TopologySource) -> Result<Self, String> {
        online.sort_unstable();
        online.dedup();
        let processor_count = online
            .last()
            .map(|max| max + 1)
            .ok_or_else(|| format!("{} lists no CPUs", source))?;
        Ok(Self {
            processor_count,
            online,
            source,
        })
    }

    /// Number of CPUs expected in every counter table.
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Per-slot flags telling which CPU rows are required.
    pub fn online_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.processor_count];
        for &cpu in &self.online {
            if let Some(slot) = mask.get_mut(cpu) {
                *slot = true;
            }
        }
        mask
    }
}

/// Parses an online CPU list such as `0-3,6-7`.
pub fn topology_from_online(content: &str) -> Result<Topology, String> {
    let ids = cpuset::parse_cpu_ids(content.trim()).map_err(|e| e.to_string())?;
    Topology::from_online(ids, TopologySource::OnlineList)
}

/// Reads the topology from the online CPU list.
pub fn read_online_topology(path: &Path) -> Result<Topology, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    topology_from_online(&content)
}

/// Reads the topology from the per-CPU rows of the counter source.
pub fn read_counter_topology(stat_path: &Path) -> Result<Topology, String> {
    let content = fs::read_to_string(stat_path)
        .map_err(|e| format!("Failed to read {}: {}", stat_path.display(), e))?;
    Topology::from_online(procstat::cpu_row_ids(&content), TopologySource::CounterRows)
        .map_err(|e| format!("{} in {}", e, stat_path.display()))
}

/// Number of configured processors as reported by the C library.
pub fn sysconf_processor_count() -> Result<usize, String> {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if n <= 0 {
        return Err("sysconf(_SC_NPROCESSORS_CONF) failed".to_string());
    }
    Ok(n as usize)
}

/// Discovers the CPU topology.
///
/// Tries the online CPU list first, then the rows of the counter source,
/// then sysconf.
pub fn discover_topology(online_path: &Path, stat_path: &Path) -> Result<Topology, String> {
    match read_online_topology(online_path) {
        Ok(topology) => return Ok(topology),
        Err(e) => debug!("Online CPU list unavailable: {}", e),
    }

    match read_counter_topology(stat_path) {
        Ok(topology) => return Ok(topology),
        Err(e) => warn!("Cannot read CPU rows: {}", e),
    }

    let processor_count = sysconf_processor_count()?;
    Topology::from_online((0..processor_count).collect(), TopologySource::Sysconf)
}
