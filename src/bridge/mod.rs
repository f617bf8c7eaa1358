//! The bridge core.
//!
//! [`Bridge`] is the shared state every inbound event and query runs
//! against: config, the identity mapper, the room table, the IRC
//! connection pool and the homeserver client. It is built once at startup
//! with the transports injected, and shared behind an `Arc`.
//!
//! - [`router`]: Matrix event dispatch
//! - [`lanes`]: in-order dispatch per room
//! - [`provision`]: invite, alias-query and user-query flows

pub mod lanes;
pub mod provision;
pub mod router;

pub use lanes::RoomLanes;

use crate::config::{Config, IrcServerConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::identity::IdentityMapper;
use crate::irc::IrcConnector;
use crate::matrix::MatrixClient;
use crate::pool::ConnectionPool;
use crate::state::RoomStore;
use std::sync::Arc;

/// Central shared state.
pub struct Bridge {
    pub config: Arc<Config>,

    /// Virtual user and alias mapping.
    pub identities: IdentityMapper,

    /// Channel/room mappings, PM rooms, registered users.
    pub rooms: Arc<RoomStore>,

    /// IRC client handles.
    pub pool: Arc<ConnectionPool>,

    /// Homeserver client-server API.
    pub matrix: Arc<dyn MatrixClient>,
}

impl Bridge {
    pub fn new(
        config: Config,
        connector: Arc<dyn IrcConnector>,
        matrix: Arc<dyn MatrixClient>,
    ) -> Self {
        let identities = IdentityMapper::from_config(&config);
        let rooms = Arc::new(RoomStore::from_config(&config));
        let pool = Arc::new(ConnectionPool::new(config.servers.clone(), connector));
        Self {
            config: Arc::new(config),
            identities,
            rooms,
            pool,
            matrix,
        }
    }

    /// The config block for an IRC network.
    pub fn server(&self, server_id: &str) -> BridgeResult<&Arc<IrcServerConfig>> {
        self.config
            .server(server_id)
            .ok_or_else(|| BridgeError::UnknownServer(server_id.to_string()))
    }
}
