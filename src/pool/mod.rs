//! Connection pool.
//!
//! One [`ClientHandle`] per (server id, [`ClientOwner`]), each backed by its
//! own actor task that owns the IRC connection and serializes connect, join
//! and send. Handles are created lazily and live for the process lifetime.
//!
//! Clients are keyed by the full Matrix user id, never by nick. The nick is
//! claimed when the handle is created: the plain localpart nick if it is
//! free on that network, otherwise a domain-tagged variant, so users with
//! the same localpart on different homeservers never share a connection.

mod actor;

pub use actor::{ClientHandle, ClientState};

use crate::config::IrcServerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::identity::{irc_nick_candidates, irc_nick_for};
use crate::irc::IrcConnector;
use crate::metrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use slirc_proto::irc_to_lower;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Who a pooled client speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientOwner {
    /// The network's bridge bot.
    Bot,
    /// A real Matrix user, by full user id.
    User(String),
}

impl ClientOwner {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User(user_id.into())
    }
}

impl fmt::Display for ClientOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bot => f.write_str("<bot>"),
            Self::User(user_id) => f.write_str(user_id),
        }
    }
}

/// Identifies one pooled client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub server_id: String,
    pub owner: ClientOwner,
}

impl ClientKey {
    pub fn new(server_id: &str, owner: ClientOwner) -> Self {
        Self {
            server_id: server_id.to_string(),
            owner,
        }
    }
}

/// Where an IRC action is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A channel; the client joins it before delivering.
    Channel(String),
    /// A nick; delivered as a private message with no join.
    Nick(String),
}

impl Target {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Channel(name) | Self::Nick(name) => name,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Channel(name) => Some(name),
            Self::Nick(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the bridge says or does on IRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcAction {
    /// PRIVMSG.
    Say(String),
    /// CTCP ACTION.
    Act(String),
    /// CTCP-framed NOTICE.
    CtcpNotice(String),
    /// TOPIC change.
    Topic(String),
}

impl IrcAction {
    /// Label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Say(_) => "say",
            Self::Act(_) => "action",
            Self::CtcpNotice(_) => "notice",
            Self::Topic(_) => "topic",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Say(t) | Self::Act(t) | Self::CtcpNotice(t) | Self::Topic(t) => t,
        }
    }
}

/// Registry of IRC client handles.
pub struct ConnectionPool {
    servers: BTreeMap<String, Arc<IrcServerConfig>>,
    connector: Arc<dyn IrcConnector>,
    clients: DashMap<ClientKey, ClientHandle>,
    /// (server id, case-folded nick) pairs handed out so far. Guards handle
    /// creation so two owners never race for one nick.
    claimed: Mutex<HashSet<(String, String)>>,
}

impl ConnectionPool {
    pub fn new(
        servers: BTreeMap<String, Arc<IrcServerConfig>>,
        connector: Arc<dyn IrcConnector>,
    ) -> Self {
        let claimed = servers
            .iter()
            .map(|(id, server)| (id.clone(), irc_to_lower(&server.nick)))
            .collect();
        Self {
            servers,
            connector,
            clients: DashMap::new(),
            claimed: Mutex::new(claimed),
        }
    }

    fn server(&self, server_id: &str) -> BridgeResult<&Arc<IrcServerConfig>> {
        self.servers
            .get(server_id)
            .ok_or_else(|| BridgeError::UnknownServer(server_id.to_string()))
    }

    /// The handle for `owner` on a network, spawning its actor on first use.
    ///
    /// Does not connect; the first join or send will.
    pub fn client(&self, server_id: &str, owner: &ClientOwner) -> BridgeResult<ClientHandle> {
        let server = self.server(server_id)?;
        let key = ClientKey::new(server_id, owner.clone());
        if let Some(handle) = self.clients.get(&key) {
            return Ok(handle.clone());
        }

        let mut claimed = self.claimed.lock();
        if let Some(handle) = self.clients.get(&key) {
            return Ok(handle.clone());
        }
        let nick = match owner {
            ClientOwner::Bot => server.nick.clone(),
            ClientOwner::User(user_id) => irc_nick_candidates(user_id)
                .find(|nick| !claimed.contains(&(server_id.to_string(), irc_to_lower(nick))))
                .unwrap_or_else(|| irc_nick_for(user_id)),
        };
        claimed.insert((server_id.to_string(), irc_to_lower(&nick)));

        debug!(server = %server_id, owner = %owner, nick = %nick, "Spawning IRC client actor");
        metrics::inc_irc_clients();
        let handle = ClientHandle::spawn(Arc::clone(server), nick, Arc::clone(&self.connector));
        self.clients.insert(key, handle.clone());
        Ok(handle)
    }

    /// The handle for `owner` on a network, connected.
    ///
    /// Concurrent callers for the same owner share one connection attempt.
    pub async fn get_or_create_client(&self, server_id: &str, owner: &ClientOwner) -> BridgeResult<ClientHandle> {
        let handle = self.client(server_id, owner)?;
        handle.connect().await?;
        Ok(handle)
    }

    /// The bridge bot's connected handle on a network.
    pub async fn bot_client(&self, server_id: &str) -> BridgeResult<ClientHandle> {
        self.get_or_create_client(server_id, &ClientOwner::Bot).await
    }

    /// Join `channel` on `handle`, resolving once joined.
    pub async fn join_channel(&self, handle: &ClientHandle, channel: &str) -> BridgeResult<ClientHandle> {
        handle.join(channel).await?;
        Ok(handle.clone())
    }

    /// Deliver an action, joining first when the target is a channel.
    pub async fn send(&self, handle: &ClientHandle, target: Target, action: IrcAction) -> BridgeResult<()> {
        handle.send(target, action).await
    }

    /// Number of handles in the pool.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
