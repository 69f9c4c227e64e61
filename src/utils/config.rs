//! Configuration management for the chat node.
//!
//! TOML-based configuration layered from defaults, an optional file and
//! environment variables. The defaults reproduce the node's built-in
//! constants, so running without any configuration behaves identically.

use crate::utils::{ConfigError, Result};
use libp2p::{Multiaddr, StreamProtocol};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "mdns-chat.toml";

/// Environment variable prefix for configuration
pub const ENV_PREFIX: &str = "CHAT";

/// Complete configuration for the chat node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Protocol identifiers and probing
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Terminal output
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listening and discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Multiaddresses to listen on
    pub listen_addresses: Vec<String>,
    /// Enable mDNS local network discovery
    pub enable_mdns: bool,
    /// Interval between mDNS queries in seconds
    pub mdns_query_interval_secs: u64,
    /// How long a connection without open streams is kept, in seconds
    pub idle_connection_timeout_secs: u64,
}

/// Wire protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Protocol identifier of the chat stream
    pub chat_protocol: String,
    /// Protocol identifier of the latency probe
    pub ping_protocol: String,
    /// Give up on a latency probe after this many seconds (unset waits forever)
    pub probe_timeout_secs: Option<u64>,
}

/// Terminal output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Colorize messages received from peers
    pub color: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addresses: vec![crate::defaults::LISTEN_ADDRESS.to_string()],
            enable_mdns: true,
            mdns_query_interval_secs: crate::defaults::MDNS_QUERY_INTERVAL,
            idle_connection_timeout_secs: crate::defaults::IDLE_CONNECTION_TIMEOUT,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            chat_protocol: crate::defaults::CHAT_PROTOCOL.to_string(),
            ping_protocol: crate::defaults::PING_PROTOCOL.to_string(),
            probe_timeout_secs: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Parsed listen addresses
    pub fn listen_multiaddrs(&self) -> Result<Vec<Multiaddr>> {
        self.listen_addresses
            .iter()
            .map(|addr| {
                addr.parse().map_err(|_| {
                    ConfigError::InvalidValue {
                        field: "network.listen_addresses".to_string(),
                        value: addr.clone(),
                    }
                    .into()
                })
            })
            .collect()
    }

    /// mDNS query interval
    pub fn mdns_query_interval(&self) -> Duration {
        Duration::from_secs(self.mdns_query_interval_secs)
    }

    /// Idle connection timeout
    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_connection_timeout_secs)
    }
}

impl ProtocolConfig {
    /// Chat protocol identifier
    pub fn chat(&self) -> Result<StreamProtocol> {
        parse_protocol("protocol.chat_protocol", &self.chat_protocol)
    }

    /// Ping protocol identifier
    pub fn ping(&self) -> Result<StreamProtocol> {
        parse_protocol("protocol.ping_protocol", &self.ping_protocol)
    }

    /// Optional probe timeout
    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_protocol(field: &str, value: &str) -> Result<StreamProtocol> {
    StreamProtocol::try_from_owned(value.to_string()).map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

impl ChatConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with multiple sources (default, file, environment)
    ///
    /// An explicit path that does not exist is an error; otherwise the
    /// default locations are tried in order and the first hit wins.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default_locations()
                .into_iter()
                .find(|location| location.exists())
                .map(Self::from_file)
                .transpose()?
                .unwrap_or_default(),
        };

        config = config.merge_from_env()?;
        config.validate()?;

        Ok(config)
    }

    fn default_locations() -> Vec<PathBuf> {
        vec![
            PathBuf::from(DEFAULT_CONFIG_FILE),
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mdns-chat")
                .join(DEFAULT_CONFIG_FILE),
        ]
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Merge configuration from environment variables
    fn merge_from_env(mut self) -> Result<Self> {
        if let Ok(addr) = std::env::var(format!("{ENV_PREFIX}_NETWORK_LISTEN_ADDRESS")) {
            self.network.listen_addresses = vec![addr];
        }

        let timeout_var = format!("{ENV_PREFIX}_PROTOCOL_PROBE_TIMEOUT_SECS");
        if let Ok(secs) = std::env::var(&timeout_var) {
            self.protocol.probe_timeout_secs =
                Some(secs.parse().map_err(|_| ConfigError::InvalidValue {
                    field: timeout_var,
                    value: secs,
                })?);
        }

        if let Ok(level) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.network.listen_addresses.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "network.listen_addresses".to_string(),
                value: "[]".to_string(),
            }
            .into());
        }
        self.network.listen_multiaddrs()?;

        if self.network.mdns_query_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.mdns_query_interval_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.network.idle_connection_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.idle_connection_timeout_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let chat = self.protocol.chat()?;
        let ping = self.protocol.ping()?;
        if chat == ping {
            return Err(ConfigError::InvalidValue {
                field: "protocol.ping_protocol".to_string(),
                value: self.protocol.ping_protocol.clone(),
            }
            .into());
        }

        if self.protocol.probe_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "protocol.probe_timeout_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    value: self.logging.level.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Get the configuration as a pretty-printed TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::ParseError {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use crate::utils::ChatError;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.network.listen_addresses, vec!["/ip4/0.0.0.0/tcp/0"]);
        assert_eq!(config.protocol.chat().unwrap().as_ref(), "/chat/1.0.0");
        assert_eq!(config.protocol.ping().unwrap().as_ref(), "/ping/1.0.0");
        assert!(config.protocol.probe_timeout().is_none());
        assert!(config.network.enable_mdns);
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = ChatConfig::default();
        config.protocol.probe_timeout_secs = Some(5);
        let temp_file = NamedTempFile::new().unwrap();

        config.save(temp_file.path()).unwrap();
        let loaded = ChatConfig::from_file(temp_file.path()).unwrap();

        assert_eq!(loaded.protocol.probe_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(loaded.network.listen_addresses, config.network.listen_addresses);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[protocol]\nchat_protocol = \"/chat/2.0.0\"\n").unwrap();

        let loaded = ChatConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.protocol.chat_protocol, "/chat/2.0.0");
        assert_eq!(loaded.protocol.ping_protocol, "/ping/1.0.0");
        assert!(loaded.network.enable_mdns);
    }

    #[test]
    fn test_missing_file() {
        let result = ChatConfig::load(Some(Path::new("/nonexistent/mdns-chat.toml")));
        assert_err!(result);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChatConfig::default();
        config.network.listen_addresses = vec!["not a multiaddr".to_string()];
        assert_err!(config.validate());

        config = ChatConfig::default();
        config.network.mdns_query_interval_secs = 0;
        assert_err!(config.validate());

        config = ChatConfig::default();
        config.network.idle_connection_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ChatError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "network.idle_connection_timeout_secs"
        ));

        config = ChatConfig::default();
        config.protocol.chat_protocol = "chat".to_string();
        assert_err!(config.validate());

        config = ChatConfig::default();
        config.protocol.ping_protocol = config.protocol.chat_protocol.clone();
        assert_err!(config.validate());

        config = ChatConfig::default();
        config.protocol.probe_timeout_secs = Some(0);
        assert_err!(config.validate());

        config = ChatConfig::default();
        config.logging.level = "loud".to_string();
        assert_err!(config.validate());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("CHAT_PROTOCOL_PROBE_TIMEOUT_SECS", "7");
        std::env::set_var("CHAT_NETWORK_LISTEN_ADDRESS", "/ip4/127.0.0.1/tcp/4001");

        let config = ChatConfig::default().merge_from_env().unwrap();
        assert_eq!(config.protocol.probe_timeout_secs, Some(7));
        assert_eq!(config.network.listen_addresses, vec!["/ip4/127.0.0.1/tcp/4001"]);

        std::env::remove_var("CHAT_PROTOCOL_PROBE_TIMEOUT_SECS");
        std::env::remove_var("CHAT_NETWORK_LISTEN_ADDRESS");
    }
}
