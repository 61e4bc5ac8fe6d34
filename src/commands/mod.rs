//! CLI command implementations for herakles-pool-cpu-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `test`: Utilization sampling test
//! - `pools`: Pool listing

pub mod check;
pub mod config;
pub mod pools;
pub mod test;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use pools::command_pools;
pub use test::command_test;

use herakles_pool_cpu_exporter::{PoolDescriptor, PoolFile, PoolSource};
use std::collections::BTreeMap;

use crate::config::Config;

/// Loads the configured pool table, or an empty one when no pool file is set.
pub(crate) fn load_pools(
    config: &Config,
) -> Result<BTreeMap<String, PoolDescriptor>, Box<dyn std::error::Error>> {
    match &config.pools_file {
        Some(path) => Ok(PoolFile::new(path).pools()?),
        None => Ok(BTreeMap::new()),
    }
}
