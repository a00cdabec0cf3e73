use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use tollgate_auth::http::DEFAULT_RESOURCE_HEADER;
use tollgate_auth::{AuthConfig, Client, StorageTimeouts};
use tollgate_auth_postgres::PostgresConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Token issuance, cache and batching settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Configuration that failed to load or validate.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("config build error: {0}")]
    Build(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("auth config error: {0}")]
    Auth(#[from] tollgate_auth::ConfigError),
}

impl ConfigLoadError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        // Server validations
        if self.server.port == 0 {
            return Err(ConfigLoadError::invalid("server.port must be > 0"));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigLoadError::invalid("server.body_limit_bytes must be > 0"));
        }
        if self.server.shutdown_timeout.is_zero() {
            return Err(ConfigLoadError::invalid("server.shutdown_timeout must be > 0"));
        }
        if HeaderName::try_from(self.server.resource_header.as_str()).is_err() {
            return Err(ConfigLoadError::invalid(format!(
                "server.resource_header '{}' is not a valid header name",
                self.server.resource_header
            )));
        }
        // Storage validations
        if self.storage.operation_timeout.is_zero() || self.storage.batch_timeout.is_zero() {
            return Err(ConfigLoadError::invalid("storage timeouts must be > 0"));
        }
        if self.storage.backend == StorageBackend::Postgres {
            if self.storage.postgres.url.is_empty() {
                return Err(ConfigLoadError::invalid(
                    "storage.postgres.url must be set for the postgres backend",
                ));
            }
            if self.storage.postgres.max_connections == 0 {
                return Err(ConfigLoadError::invalid(
                    "storage.postgres.max_connections must be > 0",
                ));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigLoadError::invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        self.auth.validate()?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Deadline for each shutdown step and for draining in-flight requests.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Header naming the resource on `/oauth/validate` requests.
    #[serde(default = "default_resource_header")]
    pub resource_header: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_resource_header() -> String {
    DEFAULT_RESOURCE_HEADER.into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            shutdown_timeout: default_shutdown_timeout(),
            resource_header: default_resource_header(),
        }
    }
}

/// Which credential store backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local maps; tokens are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,
    #[serde(default = "default_batch_timeout", with = "humantime_serde")]
    pub batch_timeout: Duration,
    /// Clients registered at startup. Only the memory backend reads these.
    #[serde(default)]
    pub clients: Vec<Client>,
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_batch_timeout() -> Duration {
    Duration::from_secs(10)
}

impl StorageConfig {
    pub fn timeouts(&self) -> StorageTimeouts {
        StorageTimeouts {
            operation: self.operation_timeout,
            batch: self.batch_timeout,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            postgres: PostgresConfig::default(),
            operation_timeout: default_operation_timeout(),
            batch_timeout: default_batch_timeout(),
            clients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

pub mod loader {
    use super::{AppConfig, ConfigLoadError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "tollgate.toml";

    /// Loads the TOML file at `path` (or [`DEFAULT_CONFIG_PATH`]) if it
    /// exists, applies `TOLLGATE__SECTION__KEY` environment overrides and
    /// validates the result.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigLoadError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., TOLLGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("TOLLGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: AppConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}
