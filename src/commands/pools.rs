//! Pools command implementation.

use herakles_pool_cpu_exporter::{expand, PoolDescriptor};
use std::collections::BTreeMap;

use crate::commands::load_pools;
use crate::config::Config;

/// Lists pools from the pool definitions file
pub fn command_pools(
    verbose: bool,
    def_name: Option<String>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("📊 Herakles Pool CPU Exporter - Pools");
    println!("=====================================");

    let Some(path) = &config.pools_file else {
        println!("\n⚠️  No pools_file configured");
        return Ok(());
    };
    println!("Source: {}", path.display());

    let pools = load_pools(config)?;
    let selected = filter_pools(&pools, def_name.as_deref());

    for spec in &selected {
        println!("\n🏷️  Pool: {}", spec.pool_name);
        println!("{}", "─".repeat(50));
        println!("   ├─ Definition: {}", spec.definition_name);
        match expand(&spec.processor_set) {
            Ok(cpus) => println!(
                "   ├─ CPUs: {} ({})",
                spec.processor_set,
                cpus.join(" ")
            ),
            Err(e) => println!("   ├─ ❌ CPUs: {} ({})", spec.processor_set, e),
        }
        println!("   ├─ Memory: {}", spec.memory_set);

        if verbose {
            println!("   ├─ Pods: {}", spec.pod_names);
            println!("   └─ Containers: {}", spec.container_names);
        }
    }

    println!(
        "\n📋 Total: {} of {} pools",
        selected.len(),
        pools.len()
    );

    Ok(())
}

/// Pools whose definition name contains `def_name`, in pool name order.
pub fn filter_pools<'a>(
    pools: &'a BTreeMap<String, PoolDescriptor>,
    def_name: Option<&str>,
) -> Vec<&'a PoolDescriptor> {
    pools
        .values()
        .filter(|spec| def_name.map_or(true, |filter| spec.definition_name.contains(filter)))
        .collect()
}
