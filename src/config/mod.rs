//! Registry configuration.
//!
//! Loaded from YAML files or environment variables, mirroring the
//! layered sources of the wider deployment: defaults, then an explicit
//! file, then the `ROLLCALL_CONFIG` file, then `ROLLCALL`-prefixed
//! environment variables.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ROLLCALL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ROLLCALL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ROLLCALL_LOG";

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal at construction: a registry is never built
/// from a configuration that fails validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("store provider must not be empty")]
    EmptyProvider,

    #[error("store connection must not be empty")]
    EmptyConnection,

    #[error("unknown store provider: {0}")]
    UnknownProvider(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// How `subscribe` treats the backing store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeMode {
    /// Persist the (message type, inbox) pair; idempotent.
    #[default]
    Register,
    /// Verify the pair was provisioned out-of-band; never mutate.
    Validate,
    /// Do nothing; the store is never touched.
    Ignore,
}

/// Subscription registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Store provider identifier (e.g. "sqlite").
    pub provider: String,
    /// Provider-specific connection string.
    pub connection: String,
    /// Subscription mode.
    pub mode: SubscribeMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            connection: "data/subscriptions.db".to_string(),
            mode: SubscribeMode::default(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from file and environment.
    ///
    /// Sources in order of priority (later overrides earlier):
    /// 1. `rollcall.yaml` in the current directory (if present)
    /// 2. File given by the `path` argument (if provided)
    /// 3. File given by `ROLLCALL_CONFIG` (if set)
    /// 4. Environment variables with the `ROLLCALL` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let loaded = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RegistryConfig = loaded.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the registry cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.is_empty() {
            return Err(ConfigError::EmptyProvider);
        }
        if self.connection.is_empty() {
            return Err(ConfigError::EmptyConnection);
        }
        Ok(())
    }
}
