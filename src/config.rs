//! Runtime configuration
//!
//! `BulkguardConfig` supplies the connection string and the bulk-copy and
//! command tuning defaults every operation starts from. Individual operations
//! override the tuning through their fluent `with_*` methods.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "config/bulkguard.toml";
const ENV_PREFIX: &str = "BULKGUARD";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BulkguardConfig {
    /// Connection string handed to the `Connector`
    #[serde(default)]
    pub url: String,
    /// Rows per bulk-copy batch, 0 sends everything in one batch
    #[serde(default)]
    pub batch_size: u32,
    #[serde(default = "default_bulk_copy_timeout_seconds")]
    pub bulk_copy_timeout_seconds: u64,
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,
    /// Rows between progress notifications, 0 disables them
    #[serde(default)]
    pub notify_after: u32,
    #[serde(default)]
    pub enable_streaming: bool,
}

fn default_bulk_copy_timeout_seconds() -> u64 {
    600
}

fn default_command_timeout_seconds() -> u64 {
    600
}

impl Default for BulkguardConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            batch_size: 0,
            bulk_copy_timeout_seconds: default_bulk_copy_timeout_seconds(),
            command_timeout_seconds: default_command_timeout_seconds(),
            notify_after: 0,
            enable_streaming: false,
        }
    }
}

impl BulkguardConfig {
    /// Configuration with the given connection string and default tuning
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load the configuration from `config/bulkguard.toml`, falling back to env vars.
    ///
    /// Values live in a `[bulkguard]` section; environment variables use the
    /// `BULKGUARD__` prefix, e.g. `BULKGUARD__BULKGUARD__BATCH_SIZE=5000`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // File present but unreadable: retry with env only
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {}",
                        CONFIG_FILE,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        config::ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // A missing section means defaults throughout
        match settings.get::<BulkguardConfig>("bulkguard") {
            Ok(cfg) => Ok(cfg),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(config::ConfigError::Message(format!(
                "Bulkguard configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    pub fn bulk_copy_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_copy_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}
