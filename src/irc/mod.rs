//! IRC transport seam.
//!
//! The connection pool drives IRC through these traits so tests can
//! substitute an in-process fake. [`line::TcpConnector`] is the real
//! implementation over a plaintext TCP socket.

pub mod line;

pub use line::TcpConnector;

use crate::config::IrcServerConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Transport-level IRC failures.
#[derive(Debug, Clone, Error)]
pub enum IrcError {
    #[error("io error: {0}")]
    Io(String),
    #[error("connection closed")]
    Closed,
    /// The server refused a request with a numeric reply.
    #[error("server replied {code}: {text}")]
    Rejected { code: u16, text: String },
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    /// A channel or nick that cannot be written as a single parameter.
    #[error("invalid target {0:?}")]
    InvalidTarget(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for IrcError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<slirc_proto::error::ProtocolError> for IrcError {
    fn from(e: slirc_proto::error::ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Opens IRC connections.
#[async_trait]
pub trait IrcConnector: Send + Sync {
    /// Connect and register `nick` on `server`.
    ///
    /// Resolves once the server has welcomed the client.
    async fn connect(
        &self,
        server: &IrcServerConfig,
        nick: &str,
    ) -> Result<Arc<dyn IrcConnection>, IrcError>;
}

/// One registered IRC connection.
#[async_trait]
pub trait IrcConnection: Send + Sync {
    /// The nick this connection registered with.
    fn nick(&self) -> &str;

    /// `false` once the socket has closed.
    fn is_alive(&self) -> bool;

    /// Join a channel, resolving when the server echoes the JOIN.
    ///
    /// Fails with [`IrcError::InvalidTarget`] before writing anything when
    /// `channel` is not a valid channel name.
    async fn join(&self, channel: &str) -> Result<(), IrcError>;

    /// PRIVMSG.
    async fn say(&self, target: &str, text: &str) -> Result<(), IrcError>;

    /// CTCP ACTION (`/me`).
    async fn action(&self, target: &str, text: &str) -> Result<(), IrcError>;

    /// CTCP-framed message; `kind == "notice"` is sent as NOTICE, anything
    /// else as PRIVMSG.
    async fn ctcp(&self, target: &str, kind: &str, text: &str) -> Result<(), IrcError>;

    /// Set a channel topic. Line breaks in `topic` become spaces.
    async fn topic(&self, channel: &str, topic: &str) -> Result<(), IrcError>;

    /// Whether `nick` is currently online.
    async fn whois(&self, nick: &str) -> Result<bool, IrcError>;
}
