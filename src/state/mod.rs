//! Process-wide bridge state.
//!
//! Holds the room mapping table and the registry of provisioned virtual
//! users. Live IRC connections are owned by [`crate::pool`].

mod rooms;

pub use rooms::{IrcChannel, PmRoom, RoomStore};
