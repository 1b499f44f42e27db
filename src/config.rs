use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::rate_limit_config::LimiterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envconfig::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Envconfig, Validate, Clone)]
pub struct Config {
    /// Listen port, bound on all interfaces
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,

    /// Upper bound on handling a single request
    #[envconfig(from = "REQUEST_TIMEOUT", default = "30s")]
    pub request_timeout: humantime::Duration,

    #[envconfig(from = "DATABASE_TYPE", default = "csv")]
    pub database_type: DatabaseType,

    /// Location table, one `ip,city,country` row per line
    #[envconfig(from = "DATABASE_FILE_PATH", default = "./data/ip_locations.csv")]
    #[validate(length(min = 1, message = "database file path cannot be empty"))]
    pub database_file_path: String,

    #[envconfig(from = "RATE_LIMIT_RPS", default = "20")]
    #[validate(range(min = 1, message = "requests per second must be positive"))]
    pub rate_limit_rps: u32,

    #[envconfig(from = "RATE_LIMIT_BURST", default = "20")]
    #[validate(range(min = 1, message = "burst size must be positive"))]
    pub rate_limit_burst: u32,

    #[envconfig(from = "RATE_LIMIT_CLEANUP_INTERVAL", default = "1m")]
    pub rate_limit_cleanup_interval: humantime::Duration,

    #[envconfig(from = "RATE_LIMIT_INACTIVE_THRESHOLD", default = "5m")]
    pub rate_limit_inactive_threshold: humantime::Duration,

    /// Separate budget for the `/debug/` routes
    #[envconfig(from = "DEBUG_RATE_LIMIT_RPS", default = "100")]
    #[validate(range(min = 1, message = "debug requests per second must be positive"))]
    pub debug_rate_limit_rps: u32,

    #[envconfig(from = "DEBUG_RATE_LIMIT_BURST", default = "200")]
    #[validate(range(min = 1, message = "debug burst size must be positive"))]
    pub debug_rate_limit_burst: u32,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,

    #[envconfig(from = "LOG_FORMAT", default = "json")]
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit set of variables
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let config = Config::init_from_hashmap(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout.into()
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig {
            kind: self.database_type,
            file_path: PathBuf::from(&self.database_file_path),
        }
    }

    /// Limits for user-facing routes
    pub fn rate_limit(&self) -> LimiterConfig {
        LimiterConfig::new(
            self.rate_limit_rps,
            self.rate_limit_burst,
            self.rate_limit_cleanup_interval.into(),
            self.rate_limit_inactive_threshold.into(),
        )
    }

    /// Limits for the `/debug/` routes; idle handling matches the main limiter
    pub fn debug_rate_limit(&self) -> LimiterConfig {
        LimiterConfig::new(
            self.debug_rate_limit_rps,
            self.debug_rate_limit_burst,
            self.rate_limit_cleanup_interval.into(),
            self.rate_limit_inactive_threshold.into(),
        )
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub fn log_directive(&self) -> String {
        format!("iplocate={level},tower_http={level}", level = self.log_level)
    }
}

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some(format!("must be one of: {}", LOG_LEVELS.join(", ")).into());
        Err(err)
    }
}

/// Backend holding the location table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Csv,
    Json,
    Xml,
    Postgres,
    Mysql,
    Redis,
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(DatabaseType::Csv),
            "json" => Ok(DatabaseType::Json),
            "xml" => Ok(DatabaseType::Xml),
            "postgres" => Ok(DatabaseType::Postgres),
            "mysql" => Ok(DatabaseType::Mysql),
            "redis" => Ok(DatabaseType::Redis),
            other => Err(format!("unknown database type '{}'", other)),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseType::Csv => "csv",
            DatabaseType::Json => "json",
            DatabaseType::Xml => "xml",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Redis => "redis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub kind: DatabaseType,
    pub file_path: PathBuf,
}
