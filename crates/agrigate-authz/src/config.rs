//! Engine configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [manager]
//! super_admin_roles = ["ADMIN"]
//!
//! [cache]
//! enabled = true
//! decision_ttl = "5m"
//! snapshot_ttl = "10m"
//! operation_timeout = "50ms"
//!
//! [audit]
//! batch_size = 100
//! flush_interval = "5s"
//! max_queue_size = 1000
//!
//! [audit.sink]
//! type = "file"
//! path = "/var/log/agrigate/audit.jsonl"
//!
//! [[roles.POPT]]
//! resource = "reports"
//! action = "view"
//! ```
//!
//! Every value can be overridden from the environment with the `AGRIGATE`
//! prefix and `__` separators, e.g. `AGRIGATE__CACHE__ENABLED=false`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AuthzError;
use crate::guard::GuardRegistry;
use crate::types::{Permission, Role};

/// Root engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Decision algorithm settings.
    pub manager: ManagerConfig,

    /// Decision cache settings.
    pub cache: CacheConfig,

    /// Audit logger settings.
    pub audit: AuditConfig,

    /// Log output settings (used by binaries installing a subscriber).
    pub logging: LoggingConfig,

    /// Replacement role catalog. Roles missing here have no permissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<HashMap<Role, Vec<Permission>>>,

    /// Replacement guard registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<GuardRegistry>,
}

/// Decision algorithm settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Roles allowed everything when a check permits the super-admin shortcut.
    pub super_admin_roles: Vec<Role>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            super_admin_roles: vec![Role::Admin],
        }
    }
}

/// Decision cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When disabled, every check is computed directly.
    pub enabled: bool,

    /// Lifetime of a cached decision.
    #[serde(with = "humantime_serde")]
    pub decision_ttl: Duration,

    /// Lifetime of a cached per-user permission snapshot.
    #[serde(with = "humantime_serde")]
    pub snapshot_ttl: Duration,

    /// Upper bound on any single backend call.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Period of the expired-entry sweep.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decision_ttl: Duration::from_secs(300),
            snapshot_ttl: Duration::from_secs(600),
            operation_timeout: Duration::from_millis(50),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Where audit entries are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditSinkConfig {
    /// Keep entries in process memory.
    #[default]
    Memory,
    /// Append entries as JSON lines to a file.
    File { path: PathBuf },
}

/// Audit logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// When disabled, entries are discarded at enqueue.
    pub enabled: bool,

    /// Maximum entries written per sink call.
    pub batch_size: usize,

    /// Period of the background flush.
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Queue length that triggers an immediate flush.
    pub max_queue_size: usize,

    /// Hard cap on queued entries; further entries are dropped and counted.
    pub max_pending: usize,

    /// Destination of flushed entries.
    pub sink: AuditSinkConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_queue_size: 1000,
            max_pending: 10_000,
            sink: AuditSinkConfig::Memory,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<ConfigError> for AuthzError {
    fn from(err: ConfigError) -> Self {
        AuthzError::configuration(err.to_string())
    }
}

impl AuthzConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A cache TTL or the cache timeout is zero while caching is enabled
    /// - An audit size or interval is zero, or `max_pending < max_queue_size`
    /// - The log level is empty
    /// - A catalog or guard override contains a malformed permission
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.enabled {
            if self.cache.decision_ttl.is_zero() || self.cache.snapshot_ttl.is_zero() {
                return Err(ConfigError::InvalidValue(
                    "cache TTLs must be greater than zero".to_string(),
                ));
            }
            if self.cache.operation_timeout.is_zero() {
                return Err(ConfigError::InvalidValue(
                    "cache.operation_timeout must be greater than zero".to_string(),
                ));
            }
        }

        if self.audit.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "audit.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.audit.flush_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "audit.flush_interval must be greater than zero".to_string(),
            ));
        }
        if self.audit.max_queue_size == 0 {
            return Err(ConfigError::InvalidValue(
                "audit.max_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.audit.max_pending < self.audit.max_queue_size {
            return Err(ConfigError::InvalidValue(format!(
                "audit.max_pending ({}) must be at least audit.max_queue_size ({})",
                self.audit.max_pending, self.audit.max_queue_size
            )));
        }
        if let AuditSinkConfig::File { path } = &self.audit.sink
            && path.as_os_str().is_empty()
        {
            return Err(ConfigError::Missing("audit.sink.path".to_string()));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "logging.level must not be empty".to_string(),
            ));
        }

        if let Some(roles) = &self.roles {
            for (role, permissions) in roles {
                for permission in permissions {
                    permission.validate().map_err(|e| {
                        ConfigError::InvalidValue(format!("roles.{role}: {e}"))
                    })?;
                }
            }
        }

        if let Some(resources) = &self.resources {
            for (name, guard) in resources {
                guard.validate().map_err(|e| {
                    ConfigError::InvalidValue(format!("resources.{name}: {e}"))
                })?;
            }
        }

        Ok(())
    }
}

pub mod loader {
    use super::{AuthzConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file, read when no path is given and it exists.
    pub const DEFAULT_CONFIG_FILE: &str = "agrigate.toml";

    /// Environment variable prefix.
    pub const ENV_PREFIX: &str = "AGRIGATE";

    /// Load configuration from an optional TOML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if an explicit path does not exist,
    /// `ConfigError::Load` if a source cannot be parsed, and
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn load_config(path: Option<&Path>) -> Result<AuthzConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::Missing(format!(
                        "config file {} not found",
                        p.display()
                    )));
                }
                builder = builder.add_source(File::from(p.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., AGRIGATE__CACHE__ENABLED=false
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: AuthzConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}
