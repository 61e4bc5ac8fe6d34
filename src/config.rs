//! Configuration loading and validation.
//!
//! Precedence: CLI (if provided) > config file > default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::Args;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_STAT_PATH: &str = "/proc/stat";
pub const DEFAULT_CPU_ONLINE_PATH: &str = "/sys/devices/system/cpu/online";
pub const DEFAULT_POLICY_NAME: &str = "podpools";
pub const DEFAULT_SAMPLE_INTERVAL: u64 = 5;
pub const DEFAULT_SAMPLE_TIMEOUT_MS: u64 = 2000;

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Sources
    #[serde(alias = "stat-path")]
    pub stat_path: Option<PathBuf>,
    #[serde(alias = "cpu-online-path")]
    pub cpu_online_path: Option<PathBuf>,
    #[serde(alias = "pools-file")]
    pub pools_file: Option<PathBuf>,

    // Sampling
    #[serde(alias = "sample-interval-secs")]
    pub sample_interval_secs: Option<u64>,
    #[serde(alias = "sample-timeout-ms")]
    pub sample_timeout_ms: Option<u64>,
    #[serde(alias = "sample-on-scrape")]
    pub sample_on_scrape: Option<bool>,

    // Labels
    #[serde(alias = "policy-name")]
    pub policy_name: Option<String>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,
    #[serde(alias = "enable-thread-metrics")]
    pub enable_thread_metrics: Option<bool>,
    #[serde(alias = "enable-pool-metrics")]
    pub enable_pool_metrics: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS
    pub enable_tls: Option<bool>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            stat_path: Some(PathBuf::from(DEFAULT_STAT_PATH)),
            cpu_online_path: Some(PathBuf::from(DEFAULT_CPU_ONLINE_PATH)),
            pools_file: None,
            sample_interval_secs: Some(DEFAULT_SAMPLE_INTERVAL),
            sample_timeout_ms: Some(DEFAULT_SAMPLE_TIMEOUT_MS),
            sample_on_scrape: Some(false),
            policy_name: Some(DEFAULT_POLICY_NAME.to_string()),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            enable_thread_metrics: Some(true),
            enable_pool_metrics: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn stat_path(&self) -> PathBuf {
        self.stat_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STAT_PATH))
    }

    pub fn cpu_online_path(&self) -> PathBuf {
        self.cpu_online_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CPU_ONLINE_PATH))
    }

    pub fn policy_name(&self) -> &str {
        self.policy_name.as_deref().unwrap_or(DEFAULT_POLICY_NAME)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if !(cfg.enable_thread_metrics.unwrap_or(true) || cfg.enable_pool_metrics.unwrap_or(true)) {
        return Err("At least one of enable_thread_metrics/enable_pool_metrics must be true".into());
    }

    if !matches!(
        cfg.log_level().to_ascii_lowercase().as_str(),
        "off" | "error" | "warn" | "info" | "debug" | "trace"
    ) {
        return Err(format!("Unknown log_level: {}", cfg.log_level()).into());
    }

    if cfg.sample_interval_secs == Some(0) {
        return Err("sample_interval_secs must be greater than 0".into());
    }

    if cfg.sample_timeout_ms == Some(0) {
        return Err("sample_timeout_ms must be greater than 0".into());
    }

    if cfg.enable_tls.unwrap_or(false) {
        match (&cfg.tls_cert_path, &cfg.tls_key_path) {
            (Some(cert), Some(key)) => {
                if !cert.exists() {
                    return Err(format!("TLS certificate not found: {}", cert.display()).into());
                }
                if !key.exists() {
                    return Err(format!("TLS key not found: {}", key.display()).into());
                }
            }
            _ => {
                return Err("enable_tls requires tls_cert_path and tls_key_path".into());
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    if let Some(path) = &args.pools_file {
        config.pools_file = Some(path.clone());
    }
    if let Some(path) = &args.stat_path {
        config.stat_path = Some(path.clone());
    }
    if let Some(path) = &args.cpu_online_path {
        config.cpu_online_path = Some(path.clone());
    }

    if let Some(secs) = args.sample_interval {
        config.sample_interval_secs = Some(secs);
    }
    if let Some(ms) = args.sample_timeout_ms {
        config.sample_timeout_ms = Some(ms);
    }
    if args.sample_on_scrape {
        config.sample_on_scrape = Some(true);
    }
    if let Some(name) = &args.policy_name {
        config.policy_name = Some(name.clone());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert) = &args.tls_cert {
        config.tls_cert_path = Some(cert.clone());
    }
    if let Some(key) = &args.tls_key {
        config.tls_key_path = Some(key.clone());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/herakles/pool-cpu-exporter.yaml",
                "/etc/herakles/pool-cpu-exporter.yml",
                "/etc/herakles/pool-cpu-exporter.json",
                "./herakles-pool-cpu-exporter.yaml",
                "./herakles-pool-cpu-exporter.yml",
                "./herakles-pool-cpu-exporter.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    let config = parse_config(&path, &content)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses a config file, picking the format from the extension (YAML by default).
pub fn parse_config(path: &Path, content: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}
