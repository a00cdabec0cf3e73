//! Authentication configuration.
//!
//! Configuration for token signing, token lifetimes, the client cache and the
//! write-behind batch writer. The server embeds [`AuthConfig`] under the
//! `[auth]` table of its configuration file.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum length of the HMAC signing secret in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Minimum token identifier length in bytes (128 bits of entropy).
pub const MIN_TOKEN_ID_BYTES: usize = 16;

/// Floor for the client cache sweep interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for the token lifetime, cache TTL and flush interval (ten years).
pub const MAX_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://auth.example.com"
///
/// [auth.signing]
/// secret = "change-me-change-me-change-me-32b"
///
/// [auth.token]
/// lifetime = "1h"
///
/// [auth.cache]
/// ttl = "5m"
/// max_size = 10000
///
/// [auth.batch]
/// max_batch = 100
/// flush_interval = "5s"
/// durability = "write_behind"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer placed in the `iss` claim and required on validation.
    pub issuer: String,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Token issuance settings.
    pub token: TokenSettings,

    /// Client cache settings.
    pub cache: ClientCacheConfig,

    /// Write-behind batch settings.
    pub batch: BatchConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            signing: SigningConfig::default(),
            token: TokenSettings::default(),
            cache: ClientCacheConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// HMAC signing configuration.
///
/// The algorithm is fixed to HS256; only the shared secret is configurable.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Server-wide shared secret used to sign and verify tokens.
    pub secret: String,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Token issuance settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Default access token lifetime.
    /// A client's own positive `access_token_ttl` takes precedence.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Random bytes per token identifier; rendered as twice as many hex chars.
    pub id_bytes: usize,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(3600),
            id_bytes: MIN_TOKEN_ID_BYTES,
        }
    }
}

/// Client cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientCacheConfig {
    /// How long a cached client stays valid.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum number of cached clients.
    pub max_size: usize,
}

impl ClientCacheConfig {
    /// Interval of the background expiry sweep: half the TTL, at least one
    /// minute and at most [`MAX_LIFETIME`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        (self.ttl / 2).clamp(MIN_SWEEP_INTERVAL, MAX_LIFETIME)
    }
}

impl Default for ClientCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: 10_000,
        }
    }
}

/// How issued token metadata reaches storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Buffer in memory and flush in batches. A crash loses unflushed records
    /// while the issued tokens stay usable until they expire.
    #[default]
    WriteBehind,
    /// Persist each record before the token is returned.
    WriteThrough,
}

/// Write-behind batch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Buffer length that triggers a flush.
    pub max_batch: usize,

    /// Interval of the periodic flush.
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Capacity of the flush worker's command queue.
    pub queue_capacity: usize,

    /// Persistence mode for issued token metadata.
    pub durability: Durability,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch: 100,
            flush_interval: Duration::from_secs(5),
            queue_capacity: 16,
            durability: Durability::WriteBehind,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The issuer is empty
    /// - The signing secret is missing or shorter than 32 bytes
    /// - The token lifetime is zero or the id length is below 16 bytes
    /// - The token lifetime, cache TTL or flush interval exceeds [`MAX_LIFETIME`]
    /// - Cache TTL/size or batch size/interval/queue capacity are zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("auth.signing.secret".to_string()));
        }
        if self.signing.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "auth.signing.secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }

        if self.token.lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.token.lifetime must be > 0".to_string(),
            ));
        }
        if self.token.lifetime > MAX_LIFETIME {
            return Err(ConfigError::InvalidValue(format!(
                "auth.token.lifetime must be <= {}s",
                MAX_LIFETIME.as_secs()
            )));
        }
        if self.token.id_bytes < MIN_TOKEN_ID_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "auth.token.id_bytes must be >= {MIN_TOKEN_ID_BYTES}"
            )));
        }

        if self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.cache.ttl must be > 0".to_string(),
            ));
        }
        if self.cache.ttl > MAX_LIFETIME {
            return Err(ConfigError::InvalidValue(format!(
                "auth.cache.ttl must be <= {}s",
                MAX_LIFETIME.as_secs()
            )));
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.cache.max_size must be > 0".to_string(),
            ));
        }

        if self.batch.max_batch == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.batch.max_batch must be > 0".to_string(),
            ));
        }
        if self.batch.flush_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.batch.flush_interval must be > 0".to_string(),
            ));
        }
        if self.batch.flush_interval > MAX_LIFETIME {
            return Err(ConfigError::InvalidValue(format!(
                "auth.batch.flush_interval must be <= {}s",
                MAX_LIFETIME.as_secs()
            )));
        }
        if self.batch.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.batch.queue_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        AuthConfig {
            signing: SigningConfig {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
            },
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "http://localhost:8080");
        assert_eq!(config.token.lifetime, Duration::from_secs(3600));
        assert_eq!(config.batch.durability, Durability::WriteBehind);
    }

    #[test]
    fn test_default_config_requires_secret() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = valid_config();
        config.signing.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_id_entropy_floor() {
        let mut config = valid_config();
        config.token.id_bytes = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lifetimes_are_bounded() {
        let mut config = valid_config();
        config.token.lifetime = MAX_LIFETIME;
        config.cache.ttl = MAX_LIFETIME;
        config.validate().unwrap();

        let mut config = valid_config();
        config.token.lifetime = Duration::from_secs(u64::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("auth.token.lifetime")
        ));

        let mut config = valid_config();
        config.cache.ttl = MAX_LIFETIME + Duration::from_secs(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("auth.cache.ttl")
        ));

        let mut config = valid_config();
        config.batch.flush_interval = Duration::from_secs(u64::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("auth.batch.flush_interval")
        ));
    }

    #[test]
    fn test_sweep_interval_floor() {
        let cache = ClientCacheConfig {
            ttl: Duration::from_millis(100),
            max_size: 2,
        };
        assert_eq!(cache.sweep_interval(), Duration::from_secs(60));

        let cache = ClientCacheConfig {
            ttl: Duration::from_secs(600),
            max_size: 2,
        };
        assert_eq!(cache.sweep_interval(), Duration::from_secs(300));

        let cache = ClientCacheConfig {
            ttl: Duration::from_secs(u64::MAX),
            max_size: 2,
        };
        assert_eq!(cache.sweep_interval(), MAX_LIFETIME);
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = valid_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_durations_and_durability() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "cache": { "ttl": "2m", "max_size": 50 },
            "batch": { "flush_interval": "250ms", "durability": "write_through" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.batch.flush_interval, Duration::from_millis(250));
        assert_eq!(config.batch.durability, Durability::WriteThrough);
        assert_eq!(config.batch.max_batch, 100);
    }
}
