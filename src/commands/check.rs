//! Check command implementation.

use herakles_pool_cpu_exporter::procstat::parse_online_counter_rows;
use herakles_pool_cpu_exporter::{aggregate, PoolDescriptor, ProcessorTimeState};
use std::collections::BTreeMap;
use std::fs;

use crate::commands::load_pools;
use crate::config::{validate_effective_config, Config};
use crate::system::{discover_topology, Topology};

/// Validates system requirements and configuration
pub fn command_check(
    proc: bool,
    pools: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Pool CPU Exporter - System Check");
    println!("============================================");

    let mut all_ok = true;
    let stat_path = config.stat_path();
    let mut topology: Option<Topology> = None;

    if proc || pools || all {
        println!("\n🧮 Checking CPU topology...");
        match discover_topology(&config.cpu_online_path(), &stat_path) {
            Ok(found) => {
                println!(
                    "   ✅ {} CPUs, {} online (from {})",
                    found.processor_count,
                    found.online_count(),
                    found.source
                );
                topology = Some(found);
            }
            Err(e) => {
                println!("   ❌ Cannot determine CPU topology: {}", e);
                all_ok = false;
            }
        }
    }

    if proc || all {
        println!("\n📁 Checking CPU counter source {}...", stat_path.display());
        match fs::read_to_string(&stat_path) {
            Ok(content) => {
                println!("   ✅ Counter source readable");
                if let Some(topology) = &topology {
                    match parse_online_counter_rows(&content, &topology.online_mask()) {
                        Ok(rows) => println!("   ✅ Parsed counters for {} CPUs", rows.len()),
                        Err(e) => {
                            println!("   ❌ Counter rows do not match topology: {}", e);
                            all_ok = false;
                        }
                    }
                }
            }
            Err(e) => {
                println!("   ❌ Cannot read counter source: {}", e);
                all_ok = false;
            }
        }
    }

    if pools || all {
        println!("\n📊 Checking pool definitions...");
        match &config.pools_file {
            None => println!("   ⚠️  No pools_file configured, only per-CPU metrics will be exported"),
            Some(path) => match load_pools(config) {
                Ok(table) => {
                    println!("   ✅ {} pools loaded from {}", table.len(), path.display());
                    if let Some(topology) = &topology {
                        let failures = check_pool_cpusets(&table, topology.processor_count);
                        for (name, error) in &failures {
                            println!("   ❌ Pool {}: {}", name, error);
                        }
                        if failures.is_empty() {
                            println!("   ✅ All pool cpusets fit the topology");
                        } else {
                            all_ok = false;
                        }
                    }
                }
                Err(e) => {
                    println!("   ❌ Cannot load pools: {}", e);
                    all_ok = false;
                }
            },
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}

/// Returns the pools whose cpuset is malformed or names CPUs outside a
/// topology of `processor_count` CPUs.
pub fn check_pool_cpusets(
    pools: &BTreeMap<String, PoolDescriptor>,
    processor_count: usize,
) -> Vec<(String, String)> {
    let empty = ProcessorTimeState::new(processor_count);
    pools
        .iter()
        .filter_map(|(name, spec)| {
            aggregate(&spec.processor_set, &empty)
                .err()
                .map(|e| (name.clone(), e.to_string()))
        })
        .collect()
}
