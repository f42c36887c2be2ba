use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::security::SecurityConfig;
use super::server::ServerConfig;
use crate::chat::ChatLimits;

/// Root configuration, loadable from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// TCP port for the HTTP/WebSocket listener.
    pub port: u16,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub chat: ChatLimits,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: super::defaults::default_port(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            chat: ChatLimits::default(),
            logging: LoggingConfig::default(),
        }
    }
}
