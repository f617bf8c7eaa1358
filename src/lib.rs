//! matrix-irc-bridge - Matrix application service bridging rooms to IRC.
//!
//! Matrix room events are translated into IRC actions sent through one
//! IRC connection per bridged user. Virtual Matrix users stand in for IRC
//! nicks, and room aliases of the form `#{server}_{channel}` provision
//! channel rooms on demand.

pub mod appservice;
pub mod bridge;
pub mod config;
pub mod error;
pub mod format;
pub mod identity;
pub mod irc;
pub mod matrix;
pub mod metrics;
pub mod pool;
pub mod state;
pub mod telemetry;

pub use bridge::Bridge;
pub use error::{BridgeError, BridgeResult, FlowStep};
