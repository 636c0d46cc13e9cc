//! CLI argument definitions for the TraceVault service binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// TraceVault — forensic media analysis service.
#[derive(Parser, Debug)]
#[command(name = "tracevault", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the SQLite store.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Number of pipeline workers.
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TRACEVAULT_CONFIG env var > platform
    /// default (~/.tracevault/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TRACEVAULT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > TRACEVAULT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("TRACEVAULT_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Resolve the log level. Returns `None` when not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Resolve the data directory override. Returns `None` when not set.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tracevault").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Expand a leading ~ to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        return PathBuf::from(home).join(&path[2..]);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_port_prefers_flag() {
        let args = CliArgs {
            config: None,
            port: Some(8088),
            data_dir: None,
            log_level: None,
            workers: None,
        };
        assert_eq!(args.resolve_port(3040), 8088);
    }

    #[test]
    fn test_resolve_port_falls_back_to_config() {
        let args = CliArgs {
            config: None,
            port: None,
            data_dir: None,
            log_level: None,
            workers: None,
        };
        assert_eq!(args.resolve_port(3040), 3040);
    }

    #[test]
    fn test_expand_home_passthrough() {
        assert_eq!(expand_home("/var/data"), PathBuf::from("/var/data"));
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/data");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
