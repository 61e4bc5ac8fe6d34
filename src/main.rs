//! herakles-pool-cpu-exporter - per-CPU and per-pool CPU utilization exporter.
//!
//! Samples `/proc/stat` in the background and serves the utilization of
//! every CPU and every configured cpuset pool as Prometheus gauges.

mod cli;
mod commands;
mod config;
mod handlers;
mod health_stats;
mod metrics;
mod sampler;
mod state;
mod status;
mod system;

use axum::{routing::get, Router};
use clap::Parser;
use herakles_pool_cpu_exporter::{
    CpuTimeStat, PoolDescriptor, PoolFile, PoolSource, ProcStatSource,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use cli::{Args, Commands, ConfigFormat};
use commands::{command_check, command_config, command_pools, command_test};
use config::{resolve_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT};
use handlers::{doc_handler, health_handler, metrics_handler, pools_handler};
use sampler::{spawn_sampler, update_sample};
use state::AppState;
use system::discover_topology;

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = commands::config::render_config(config, format, false)?;
    println!("{output}");
    Ok(())
}

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) {
    let level = match config.log_level().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {}", level);
}

/// Resolves when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), format.clone(), *commented);
        }

        let config = resolve_config(&args)?;
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }

        return match command {
            Commands::Check { proc, pools, all } => command_check(*proc, *pools, *all, &config),
            Commands::Test {
                iterations,
                interval_ms,
                verbose,
            } => command_test(*iterations, *interval_ms, *verbose, &config),
            Commands::Pools { verbose, def_name } => {
                command_pools(*verbose, def_name.clone(), &config)
            }
            Commands::Config { .. } => Ok(()),
        };
    }

    // Load configuration for main server mode
    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config);

    info!(
        "Starting herakles-pool-cpu-exporter {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    );

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR).to_string();
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let stat_path = config.stat_path();
    let topology = discover_topology(&config.cpu_online_path(), &stat_path)?;
    info!(
        "Tracking {} CPUs, {} online (from {})",
        topology.processor_count,
        topology.online_count(),
        topology.source
    );

    let cpu_stat = Arc::new(CpuTimeStat::with_online(
        ProcStatSource::new(&stat_path),
        topology.processor_count,
        &topology.online,
    ));

    let pool_source: Arc<dyn PoolSource> = match &config.pools_file {
        Some(path) => {
            info!("Reading pool definitions from {}", path.display());
            Arc::new(PoolFile::new(path))
        }
        None => {
            warn!("No pools_file configured; only per-CPU utilization will be exported");
            Arc::new(BTreeMap::<String, PoolDescriptor>::new())
        }
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        cpu_stat,
        pool_source,
        topology,
    )?);
    debug!("Prometheus registry initialized");

    // Take the baseline sample before serving
    info!("Performing initial CPU sample");
    if let Err(e) = update_sample(&state).await {
        error!("Initial CPU sample failed: {:#}", e);
    }

    let background_task = if config.sample_on_scrape.unwrap_or(false) {
        info!("Sampling on every scrape; background sampler disabled");
        None
    } else {
        Some(spawn_sampler(state.clone()))
    };

    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/pools", get(pools_handler))
        .route("/doc", get(doc_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    if config.enable_tls.unwrap_or(false) {
        let (Some(cert), Some(key)) = (&config.tls_cert_path, &config.tls_key_path) else {
            return Err("enable_tls requires tls_cert_path and tls_key_path".into());
        };
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        info!(
            "herakles-pool-cpu-exporter listening on https://{}:{}",
            bind_ip_str, port
        );
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "herakles-pool-cpu-exporter listening on http://{}:{}",
            bind_ip_str, port
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    if let Some(task) = background_task {
        task.abort();
        let _ = task.await;
    }

    info!("herakles-pool-cpu-exporter stopped gracefully");
    Ok(())
}
