//! Core configuration types and loading.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::defaults::{default_appservice_port, default_bind_address};
use super::irc::IrcServerConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The homeserver this bridge is registered with.
    pub homeserver: HomeserverConfig,
    /// Application-service registration and listener.
    pub appservice: AppserviceConfig,
    /// IRC networks, keyed by server id (e.g. "irc.example").
    #[serde(default)]
    pub servers: BTreeMap<String, Arc<IrcServerConfig>>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// Server blocks get their `id` filled in from the table key.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        for (id, server) in config.servers.iter_mut() {
            Arc::make_mut(server).id = id.clone();
        }
        Ok(config)
    }

    /// Look up a server block by id.
    pub fn server(&self, id: &str) -> Option<&Arc<IrcServerConfig>> {
        self.servers.get(id)
    }
}

/// Homeserver identity.
#[derive(Debug, Clone, Deserialize)]
pub struct HomeserverConfig {
    /// Base URL of the client-server API (e.g., "https://matrix.example.org").
    pub url: String,
    /// Server name used in user ids and aliases (e.g., "example.org").
    pub domain: String,
}

/// Application-service registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppserviceConfig {
    /// Token the homeserver presents when pushing transactions and queries.
    pub hs_token: String,
    /// Token the bridge presents to the homeserver.
    pub as_token: String,
    /// URL the homeserver uses to reach this bridge.
    pub url: String,
    /// Listener port.
    #[serde(default = "default_appservice_port")]
    pub port: u16,
    /// Listener bind address.
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r##"
[homeserver]
url = "https://some.home.server.goeshere"
domain = "some.home.server"

[appservice]
hs_token = "it's a secret"
as_token = "another secret"
url = "https://bridge.example"

[servers."irc.example"]
nick = "a_nick"

[servers."irc.example".expose]
channels = true
private_messages = true

[servers."irc.example".rooms.mappings]
"#coffee" = ["!foo:bar"]
"##;

    #[test]
    fn test_parse_fills_server_ids() {
        let config = Config::parse(SAMPLE).unwrap();
        let server = config.server("irc.example").unwrap();
        assert_eq!(server.id, "irc.example");
        assert_eq!(server.nick, "a_nick");
        assert!(server.expose.channels);
        assert_eq!(server.rooms.mappings["#coffee"], vec!["!foo:bar".to_string()]);
    }

    #[test]
    fn test_appservice_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.appservice.port, 9999);
        assert_eq!(config.appservice.bind, "0.0.0.0");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.homeserver.domain, "some.home.server");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/bridge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = Config::parse("[homeserver\nurl =").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
