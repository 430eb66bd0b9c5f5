//! Configuration module for the project tracker backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Utilization thresholds (percent) used by the workload calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadThresholds {
    /// Utilization strictly above this value marks a member as overloaded.
    pub overload_pct: f64,
    /// Utilization strictly below this value (with some load) marks a member as underloaded.
    pub underload_pct: f64,
}

impl Default for WorkloadThresholds {
    fn default() -> Self {
        Self {
            overload_pct: 100.0,
            underload_pct: 50.0,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Workload classification thresholds
    pub thresholds: WorkloadThresholds,
    /// Default page size for list endpoints
    pub page_size: u32,
}

/// Error raised when an environment variable holds an unparseable value.
#[derive(Debug)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid value for {}: {:?}", self.key, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("PT_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("PT_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let index_path = env::var("PT_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = parse_var("PT_BIND_ADDR", "127.0.0.1:8080".parse().ok())?;

        let log_level = env::var("PT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = WorkloadThresholds::default();
        let thresholds = WorkloadThresholds {
            overload_pct: parse_var("PT_OVERLOAD_THRESHOLD", Some(defaults.overload_pct))?,
            underload_pct: parse_var("PT_UNDERLOAD_THRESHOLD", Some(defaults.underload_pct))?,
        };

        let page_size = parse_var("PT_PAGE_SIZE", Some(20u32))?;

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            thresholds,
            page_size,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: Option<T>) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError { key, value }),
        Err(_) => default.ok_or(ConfigError {
            key,
            value: String::new(),
        }),
    }
}
