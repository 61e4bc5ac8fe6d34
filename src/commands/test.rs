//! Test command implementation.

use herakles_pool_cpu_exporter::{publish, CpuTimeStat, ProcStatSource, Publication};
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::load_pools;
use crate::config::Config;
use crate::system::discover_topology;

/// Samples the CPU counters and prints per-CPU and per-pool utilization
pub fn command_test(
    iterations: usize,
    interval_ms: u64,
    verbose: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧪 Herakles Pool CPU Exporter - Test Mode");
    println!("=========================================");

    let stat_path = config.stat_path();
    let topology = discover_topology(&config.cpu_online_path(), &stat_path)?;
    println!(
        "   🧮 {} CPUs, {} online (from {}), counters from {}",
        topology.processor_count,
        topology.online_count(),
        topology.source,
        stat_path.display()
    );

    let pools = load_pools(config)?;
    println!("   📊 {} pools defined", pools.len());

    let cpu_stat = CpuTimeStat::with_online(
        ProcStatSource::new(stat_path),
        topology.processor_count,
        &topology.online,
    );
    cpu_stat.sample()?;

    for iteration in 1..=iterations {
        println!("\n🔄 Iteration {}/{}:", iteration, iterations);
        thread::sleep(Duration::from_millis(interval_ms));

        let start = Instant::now();
        cpu_stat.sample()?;
        let sample_duration = start.elapsed();

        let publication = cpu_stat.with_snapshot(|snapshot| publish(snapshot, &pools))?;
        println!(
            "   ⏱️  Sample duration: {:.3}ms",
            sample_duration.as_secs_f64() * 1000.0
        );
        print_publication(&publication, verbose);
    }

    println!("\n✅ Test completed successfully");
    Ok(())
}

fn print_publication(publication: &Publication, verbose: bool) {
    let count = publication.processors.len();
    if count > 0 {
        let sum: f64 = publication
            .processors
            .iter()
            .map(|p| p.utilization_percent)
            .sum();
        println!("   📈 Average CPU utilization: {:.2}%", sum / count as f64);
    }

    if verbose {
        for record in &publication.processors {
            println!(
                "   ├─ cpu{}: {:.2}%",
                record.processor_id, record.utilization_percent
            );
        }
    }

    for record in &publication.pools {
        println!(
            "   ├─ pool {} ({}, CPUs {}): {:.2}",
            record.pool_name,
            record.definition_name,
            record.processor_set,
            record.utilization_percent
        );
    }
    for failure in &publication.failed {
        println!("   ├─ ❌ pool {}: {}", failure.pool_name, failure.error);
    }
}
