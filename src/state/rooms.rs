//! Room mapping table.
//!
//! Many-to-many association between IRC channels and Matrix rooms, seeded
//! from static config and extended by alias provisioning. Also tracks 1:1
//! rooms with IRC nicks and which virtual users have been registered.

use crate::config::Config;
use dashmap::{DashMap, DashSet};
use slirc_proto::irc_to_lower;
use std::collections::BTreeSet;
use tracing::debug;

/// A channel on a specific IRC network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrcChannel {
    pub server_id: String,
    /// Channel name as first seen (case preserved).
    pub channel: String,
}

impl IrcChannel {
    pub fn new(server_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            channel: channel.into(),
        }
    }

    fn key(&self) -> (String, String) {
        (self.server_id.clone(), irc_to_lower(&self.channel))
    }
}

/// A 1:1 room between a Matrix user and an IRC nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmRoom {
    pub server_id: String,
    pub nick: String,
    /// The real Matrix user the conversation belongs to.
    pub matrix_user: String,
}

/// Concurrent mapping table.
///
/// All reads clone out of the maps so no shard guard outlives the call.
#[derive(Debug, Default)]
pub struct RoomStore {
    /// (server id, lowercased channel) -> room ids.
    channel_rooms: DashMap<(String, String), BTreeSet<String>>,
    /// room id -> channels.
    room_channels: DashMap<String, BTreeSet<IrcChannel>>,
    /// room id -> PM peer.
    pm_rooms: DashMap<String, PmRoom>,
    /// Virtual user ids known to exist on the homeserver.
    registered: DashSet<String>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from every server's static mappings.
    pub fn from_config(config: &Config) -> Self {
        let store = Self::new();
        for (server_id, server) in &config.servers {
            for (channel, rooms) in &server.rooms.mappings {
                for room_id in rooms {
                    store.insert(&IrcChannel::new(server_id, channel), room_id);
                }
            }
        }
        store
    }

    /// Associate a channel with a room. Returns `false` if already mapped.
    pub fn insert(&self, channel: &IrcChannel, room_id: &str) -> bool {
        let added = self
            .channel_rooms
            .entry(channel.key())
            .or_default()
            .insert(room_id.to_string());
        if added {
            let mut channels = self.room_channels.entry(room_id.to_string()).or_default();
            if !channels.iter().any(|c| c.key() == channel.key()) {
                channels.insert(channel.clone());
            }
            debug!(
                server = %channel.server_id,
                channel = %channel.channel,
                room_id = %room_id,
                "Room mapping added"
            );
        }
        added
    }

    /// Channels bridged into a room.
    pub fn channels_for_room(&self, room_id: &str) -> Vec<IrcChannel> {
        self.room_channels
            .get(room_id)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms bridged to a channel.
    pub fn rooms_for_channel(&self, server_id: &str, channel: &str) -> Vec<String> {
        self.channel_rooms
            .get(&(server_id.to_string(), irc_to_lower(channel)))
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a room as a 1:1 conversation with an IRC nick.
    pub fn set_pm_room(&self, room_id: &str, pm: PmRoom) {
        self.pm_rooms.insert(room_id.to_string(), pm);
    }

    pub fn pm_room(&self, room_id: &str) -> Option<PmRoom> {
        self.pm_rooms.get(room_id).map(|r| r.value().clone())
    }

    /// Remember that a virtual user exists on the homeserver.
    pub fn mark_registered(&self, user_id: &str) {
        self.registered.insert(user_id.to_string());
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        self.registered.contains(user_id)
    }
}
