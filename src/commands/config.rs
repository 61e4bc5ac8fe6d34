//! Config command implementation.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Generates configuration files
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-pool-cpu-exporter.yaml"));

    let content = render_config(&config, format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Serializes `config` in the requested format. Comments are only added to YAML.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
    commented: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => {
            let content = serde_yaml::to_string(config)?;
            if commented {
                add_config_comments(content)
            } else {
                content
            }
        }
    };
    Ok(content)
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Pool CPU Exporter Configuration
# =========================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
#
# Sources
# -------
# stat_path: /proc/stat        # Cumulative CPU time counters
# cpu_online_path: /sys/devices/system/cpu/online  # Used to size the CPU table
# pools_file: null             # Pool definitions (YAML/JSON/TOML), re-read per scrape
#
# Sampling
# --------
# sample_interval_secs: 5      # Seconds between two samples
# sample_timeout_ms: 2000      # Fail a sample whose read takes longer
# sample_on_scrape: false      # Sample on every scrape instead of periodically
#
# Labels
# ------
# policy_name: podpools        # Value of the `policy` label on pool_cpu_usage
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable herakles_pool_cpu_* metrics
# enable_thread_metrics: true  # Export thread_cpu_usage
# enable_pool_metrics: true    # Export pool_cpu_usage
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# TLS
# ---
# enable_tls: false
# tls_cert_path: null          # PEM certificate
# tls_key_path: null           # PEM private key
"#;

    format!("{comments}\n{yaml}")
}
