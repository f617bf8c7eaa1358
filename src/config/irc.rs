//! Per-network IRC configuration.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::defaults::default_irc_port;

/// One configured IRC network.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcServerConfig {
    /// Server id, taken from the `[servers."<id>"]` table key.
    #[serde(skip)]
    pub id: String,
    /// `host:port` to connect to. Defaults to the server id on port 6667.
    pub address: Option<String>,
    /// Nick used by the bridge bot on this network.
    pub nick: String,
    /// What the bridge is allowed to bridge.
    #[serde(default)]
    pub expose: ExposeConfig,
    /// Static channel to room mappings.
    #[serde(default)]
    pub rooms: RoomsConfig,
}

impl IrcServerConfig {
    /// The `host:port` this network is reached at.
    pub fn address(&self) -> String {
        match &self.address {
            Some(addr) => addr.clone(),
            None => format!("{}:{}", self.id, default_irc_port()),
        }
    }
}

/// Exposure flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExposeConfig {
    /// Allow channels to be joined through room alias queries.
    #[serde(default)]
    pub channels: bool,
    /// Allow 1:1 rooms with IRC nicks.
    #[serde(default)]
    pub private_messages: bool,
}

/// Static room mappings: channel name to Matrix room ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomsConfig {
    #[serde(default)]
    pub mappings: BTreeMap<String, Vec<String>>,
}
