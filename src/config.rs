use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Environment variables override file values, e.g.
/// `NOSTR_BRIDGE__RELAY__CONNECT_TIMEOUT_MS=2000`.
pub const ENV_PREFIX: &str = "NOSTR_BRIDGE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upper bound on a single relay connection attempt.
    pub connect_timeout_ms: u64,
    /// How long to wait for a relay's OK after publishing.
    pub ack_timeout_ms: u64,
    /// Require at least one relay to accept an event, not just receive it.
    pub require_ack: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 5_000,
            require_ack: false,
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "nostr_bridge=info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load defaults, then an optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(BridgeError::Config(format!(
                    "Configuration file not found: {:?}",
                    path
                )));
            }
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        let config: BridgeConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay.connect_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "relay.connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.relay.ack_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "relay.ack_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }
}
