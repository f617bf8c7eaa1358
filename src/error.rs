//! Unified error handling for the bridge.
//!
//! Every fallible bridge operation returns [`BridgeError`]. Errors carry a
//! static code for metric labeling and are caught at the router and
//! appservice boundaries so one bad event never takes down the process.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provisioning steps
// ============================================================================

/// A single step of a provisioning flow.
///
/// Flow failures are tagged with the step that failed so operators can tell
/// a missing IRC nick apart from a homeserver rejecting a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStep {
    /// Resolving the target identity or alias to a configured network.
    Resolve,
    /// WHOIS against the IRC network via the bot connection.
    Whois,
    /// Registering the virtual Matrix user.
    Register,
    /// Joining the virtual user into the inviting room.
    JoinRoom,
    /// Fetching room state for membership reconciliation.
    RoomState,
    /// Checking that everyone who should be joined is joined.
    Reconcile,
    /// Creating the Matrix room for an alias query.
    CreateRoom,
    /// Joining the bot into the IRC channel for an alias query.
    JoinChannel,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Whois => "whois",
            Self::Register => "register",
            Self::JoinRoom => "join_room",
            Self::RoomState => "room_state",
            Self::Reconcile => "reconcile",
            Self::CreateRoom => "create_room",
            Self::JoinChannel => "join_channel",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Bridge errors
// ============================================================================

/// Errors produced by the translation and provisioning core.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A Matrix user id or alias does not belong to any configured IRC server.
    #[error("unrecognized identity: {0}")]
    UnrecognizedIdentity(String),

    #[error("unknown IRC server: {0}")]
    UnknownServer(String),

    #[error("no such nick {nick} on {server}")]
    NoSuchNick { server: String, nick: String },

    /// The IRC transport failed to connect, join, or write.
    #[error("connection to {server} as {nick} failed: {reason}")]
    ConnectionFailed {
        server: String,
        nick: String,
        reason: String,
    },

    #[error("{step} failed: {source}")]
    FlowStepFailed {
        step: FlowStep,
        #[source]
        source: Box<BridgeError>,
    },

    /// The homeserver answered a client-server API call with an error.
    #[error("homeserver rejected request: {errcode}: {error}")]
    TransportRejected { errcode: String, error: String },

    /// The homeserver could not be reached or sent an unreadable reply.
    #[error("homeserver request failed: {0}")]
    HomeserverUnreachable(String),

    /// The server's `expose` block does not allow this kind of bridging.
    #[error("not exposed: {0}")]
    NotExposed(String),

    /// Membership reconciliation found a user that should be joined but is not.
    #[error("{0} is not joined")]
    NotJoined(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Build a rejection from a Matrix `errcode` and message.
    pub fn rejected(errcode: impl Into<String>, error: impl Into<String>) -> Self {
        Self::TransportRejected {
            errcode: errcode.into(),
            error: error.into(),
        }
    }

    /// The Matrix `errcode` of a rejection, looking through flow wrappers.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            Self::TransportRejected { errcode, .. } => Some(errcode.as_str()),
            Self::FlowStepFailed { source, .. } => source.errcode(),
            _ => None,
        }
    }

    /// Wrap this error as the failure of a provisioning step.
    pub fn at(self, step: FlowStep) -> Self {
        Self::FlowStepFailed {
            step,
            source: Box::new(self),
        }
    }

    /// The failing step, if this is a flow error.
    pub fn step(&self) -> Option<FlowStep> {
        match self {
            Self::FlowStepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnrecognizedIdentity(_) => "unrecognized_identity",
            Self::UnknownServer(_) => "unknown_server",
            Self::NoSuchNick { .. } => "no_such_nick",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::FlowStepFailed { .. } => "flow_step_failed",
            Self::TransportRejected { .. } => "transport_rejected",
            Self::HomeserverUnreachable(_) => "homeserver_unreachable",
            Self::NotExposed(_) => "not_exposed",
            Self::NotJoined(_) => "not_joined",
            Self::MalformedEvent(_) => "malformed_event",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Extension for tagging a result with the provisioning step it belongs to.
pub trait FlowResultExt<T> {
    fn at_step(self, step: FlowStep) -> BridgeResult<T>;
}

impl<T> FlowResultExt<T> for BridgeResult<T> {
    fn at_step(self, step: FlowStep) -> BridgeResult<T> {
        self.map_err(|e| e.at(step))
    }
}
