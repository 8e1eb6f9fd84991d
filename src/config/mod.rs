/// Configuration management for hubflow
///
/// Everything is read from `HUBFLOW_*` environment variables with defaults
/// suitable for running next to the dashboard on one machine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dispatch: DispatchConfig,
    pub scheduler: SchedulerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; its parent directory is created on startup
    pub path: String,
}

/// Outbound plugin calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Host serving `/plugins/{plugin}{action}`
    pub base_url: String,
    /// Per-call timeout
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("HUBFLOW_HOST", "0.0.0.0".to_string()),
                port: env_or("HUBFLOW_PORT", 8010),
            },
            database: DatabaseConfig {
                path: env_or("HUBFLOW_DATABASE_PATH", "data/hubflow.db".to_string()),
            },
            dispatch: DispatchConfig {
                base_url: env_or("HUBFLOW_PLUGIN_BASE_URL", "http://localhost:8000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout_secs: env_or("HUBFLOW_DISPATCH_TIMEOUT_SECS", 30),
            },
            scheduler: SchedulerConfig {
                enabled: env_or("HUBFLOW_SCHEDULER_ENABLED", true),
            },
        }
    }
}

/// Parsed environment variable, or `default` when unset or unparseable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
