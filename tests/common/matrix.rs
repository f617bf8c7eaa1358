//! Fake homeserver client.
//!
//! Rooms remember who joined through the fake, so `room_state` reflects
//! earlier `join_room` calls plus any members the test seeds.

use super::Journal;
use async_trait::async_trait;
use matrix_irc_bridge::error::{BridgeError, BridgeResult};
use matrix_irc_bridge::matrix::{CreateRoomOptions, MatrixClient, RegisterRequest, StateEvent};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixCall {
    Register { login_type: String, user: String },
    JoinRoom { room_id: String, as_user: Option<String> },
    RoomState { room_id: String },
    CreateRoom { room_alias_name: String },
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<MatrixCall>>,
    /// room id -> joined user ids.
    members: Mutex<BTreeMap<String, BTreeSet<String>>>,
    /// Localparts that already exist.
    taken_users: Mutex<BTreeSet<String>>,
    /// Alias localparts that already exist.
    taken_aliases: Mutex<BTreeSet<String>>,
}

#[derive(Clone)]
pub struct FakeMatrix {
    inner: Arc<Inner>,
    journal: Arc<Journal>,
}

pub const NEW_ROOM_ID: &str = "!newroom:id";

impl FakeMatrix {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            journal,
        }
    }

    pub fn seed_member(&self, room_id: &str, user_id: &str) {
        self.inner
            .members
            .lock()
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn take_user(&self, localpart: &str) {
        self.inner.taken_users.lock().insert(localpart.to_string());
    }

    pub fn take_alias(&self, alias_localpart: &str) {
        self.inner.taken_aliases.lock().insert(alias_localpart.to_string());
    }

    pub fn calls(&self) -> Vec<MatrixCall> {
        self.inner.calls.lock().clone()
    }

    fn record(&self, call: MatrixCall, entry: String) {
        self.inner.calls.lock().push(call);
        self.journal.record(entry);
    }
}

#[async_trait]
impl MatrixClient for FakeMatrix {
    async fn register(&self, request: &RegisterRequest) -> BridgeResult<String> {
        self.record(
            MatrixCall::Register {
                login_type: request.login_type.clone(),
                user: request.user.clone(),
            },
            format!("matrix register {}", request.user),
        );
        if !self.inner.taken_users.lock().insert(request.user.clone()) {
            return Err(BridgeError::rejected("M_USER_IN_USE", "User ID already taken."));
        }
        Ok(format!("@{}:{}", request.user, super::HS_DOMAIN))
    }

    async fn join_room(&self, room_id: &str, as_user: Option<&str>) -> BridgeResult<()> {
        self.record(
            MatrixCall::JoinRoom {
                room_id: room_id.to_string(),
                as_user: as_user.map(str::to_string),
            },
            format!("matrix join_room {room_id}"),
        );
        if let Some(user) = as_user {
            self.seed_member(room_id, user);
        }
        Ok(())
    }

    async fn room_state(&self, room_id: &str, _as_user: Option<&str>) -> BridgeResult<Vec<StateEvent>> {
        self.record(
            MatrixCall::RoomState {
                room_id: room_id.to_string(),
            },
            format!("matrix room_state {room_id}"),
        );
        let members = self.inner.members.lock().get(room_id).cloned().unwrap_or_default();
        Ok(members
            .into_iter()
            .map(|user| StateEvent {
                event_type: "m.room.member".into(),
                state_key: user,
                content: json!({ "membership": "join" }),
            })
            .collect())
    }

    async fn create_room(&self, options: &CreateRoomOptions) -> BridgeResult<String> {
        self.record(
            MatrixCall::CreateRoom {
                room_alias_name: options.room_alias_name.clone(),
            },
            format!("matrix create_room {}", options.room_alias_name),
        );
        if !self.inner.taken_aliases.lock().insert(options.room_alias_name.clone()) {
            return Err(BridgeError::rejected("M_ROOM_IN_USE", "Room alias already taken"));
        }
        Ok(NEW_ROOM_ID.to_string())
    }
}
