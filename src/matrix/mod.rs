//! Matrix transport seam.
//!
//! The bridge reaches the homeserver through [`MatrixClient`]. Calls are
//! made as the application service; `as_user` masquerades as one of its
//! virtual users.

mod event;
mod http;

pub use event::{
    HTML_FORMAT, MediaContent, Membership, MessageContent, ROOM_MEMBER, ROOM_MESSAGE, ROOM_TOPIC,
    RawEvent, RoomEvent, StateEvent, TextContent, mxc_to_http,
};
pub use http::HttpMatrixClient;

use crate::error::BridgeResult;
use async_trait::async_trait;
use serde::Serialize;

/// Login type application services register users with.
pub const APPSERVICE_LOGIN_TYPE: &str = "m.login.application_service";

/// Account registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub login_type: String,
    /// Localpart to register.
    pub user: String,
}

impl RegisterRequest {
    /// Register `localpart` under the application service's namespace.
    pub fn appservice(localpart: impl Into<String>) -> Self {
        Self {
            login_type: APPSERVICE_LOGIN_TYPE.to_string(),
            user: localpart.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// `createRoom` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRoomOptions {
    pub room_alias_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub visibility: Visibility,
}

/// Client-server API calls the bridge makes.
#[async_trait]
pub trait MatrixClient: Send + Sync {
    /// Register a user, returning its full user id.
    async fn register(&self, request: &RegisterRequest) -> BridgeResult<String>;

    /// Join a room, as the bridge or as one of its users.
    async fn join_room(&self, room_id: &str, as_user: Option<&str>) -> BridgeResult<()>;

    /// Current state of a room.
    async fn room_state(&self, room_id: &str, as_user: Option<&str>) -> BridgeResult<Vec<StateEvent>>;

    /// Create a room, returning its id.
    async fn create_room(&self, options: &CreateRoomOptions) -> BridgeResult<String>;
}
