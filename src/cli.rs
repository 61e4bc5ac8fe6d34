//! CLI arguments and subcommands for herakles-pool-cpu-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-pool-cpu-exporter",
    about = "Prometheus exporter for per-CPU and per-pool CPU utilization",
    long_about = "Prometheus exporter for per-CPU and per-pool CPU utilization.\n\n\
                  Samples the cumulative CPU time counters in /proc/stat on a fixed \
                  interval and rolls the per-CPU deltas up into utilization figures \
                  for cpuset-based resource pools.",
    author = "Michael Moll <proc-mem@herakles.io> - Herakles IO",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/herakles-io/herakles-pool-cpu-exporter | More info: https://www.herakles.io | Support: proc-mem@herakles.io"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level [default: info]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Pool definitions file (YAML/JSON/TOML)
    #[arg(long)]
    pub pools_file: Option<PathBuf>,

    /// CPU time counter source
    #[arg(long)]
    pub stat_path: Option<PathBuf>,

    /// Online CPU list used for topology discovery
    #[arg(long)]
    pub cpu_online_path: Option<PathBuf>,

    /// Seconds between two CPU samples
    #[arg(long)]
    pub sample_interval: Option<u64>,

    /// Abort a counter read after N milliseconds
    #[arg(long)]
    pub sample_timeout_ms: Option<u64>,

    /// Take a fresh sample on every scrape
    #[arg(long)]
    pub sample_on_scrape: bool,

    /// Value of the `policy` label on pool metrics
    #[arg(long)]
    pub policy_name: Option<String>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal herakles_pool_cpu_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Enable HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// TLS certificate (PEM)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check the CPU counter source and topology
        #[arg(long)]
        proc: bool,

        /// Check the pool definitions file
        #[arg(long)]
        pools: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Test utilization sampling
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Milliseconds between the two samples of an iteration
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Show per-CPU utilization
        #[arg(long)]
        verbose: bool,
    },

    /// List pools from the pool definitions file
    Pools {
        /// Show pods and containers of each pool
        #[arg(long)]
        verbose: bool,

        /// Filter by pool definition name
        #[arg(short = 'd', long)]
        def_name: Option<String>,
    },
}
