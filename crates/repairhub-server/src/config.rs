//! Server configuration.
//!
//! Layers, later wins: built-in defaults, the YAML file named by
//! `REPAIRHUB_CONFIG` (default `repairhub.yaml`, optional), then
//! `REPAIRHUB_`-prefixed environment variables with `__` separating
//! nested keys, e.g. `REPAIRHUB_AUTH__JWT_ISSUER`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use repairhub_auth::AuthConfig;
use repairhub_db::DbConfig;
use repairhub_lifecycle::LifecycleConfig;
use serde::Deserialize;

const CONFIG_PATH_VAR: &str = "REPAIRHUB_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "repairhub.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub database: DbConfig,
    pub auth: AuthConfig,
    pub lifecycle: LifecycleConfig,
    pub log: LogConfig,
    /// Admin account created at startup when no admin profile exists.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "repairhub=info".into(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl ServerConfig {
    /// Load from the default locations and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load with `path` as the YAML layer. A missing file is skipped.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("REPAIRHUB_").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_private_key_pem.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_private_key_pem is required".into(),
            ));
        }
        if self.auth.jwt_public_key_pem.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_public_key_pem is required".into(),
            ));
        }
        if self.auth.min_password_length == 0 {
            return Err(ConfigError::Invalid(
                "auth.min_password_length must be at least 1".into(),
            ));
        }
        if self.lifecycle.expiry_sweep_secs == 0 {
            return Err(ConfigError::Invalid(
                "lifecycle.expiry_sweep_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
