//! Integration test common infrastructure.
//!
//! In-process fakes for both transports, sharing one [`Journal`] so tests
//! can assert on the order of IRC and Matrix calls.

#![allow(dead_code)]

pub mod irc;
pub mod matrix;

pub use irc::{FakeIrc, IrcCall};
pub use matrix::{FakeMatrix, MatrixCall};

use matrix_irc_bridge::Bridge;
use matrix_irc_bridge::config::Config;
use matrix_irc_bridge::matrix::RawEvent;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const SERVER: &str = "irc.example";
pub const BOT_NICK: &str = "a_nick";
pub const CHANNEL: &str = "#coffee";
pub const ROOM_ID: &str = "!foo:bar";
pub const HS_DOMAIN: &str = "some.home.server";
pub const HS_URL: &str = "https://some.home.server.goeshere";
pub const HS_TOKEN: &str = "it's a secret";
pub const USER_ID: &str = "@flibble:wibble";

/// How long a test waits for an asynchronous call before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// Ordered record of every transport call, across both fakes.
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
    changed: Notify,
}

impl Journal {
    pub fn record(&self, entry: String) {
        self.entries.lock().push(entry);
        self.changed.notify_waiters();
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    /// Wait until an entry starting with `prefix` is recorded.
    pub async fn wait_for(&self, prefix: &str) -> String {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let changed = self.changed.notified();
            if let Some(entry) = self.entries().into_iter().find(|e| e.starts_with(prefix)) {
                return entry;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                panic!("timed out waiting for {prefix:?}; journal: {:#?}", self.entries());
            }
        }
    }
}

/// Exposure flags for the test network.
#[derive(Debug, Clone, Copy)]
pub struct Expose {
    pub channels: bool,
    pub private_messages: bool,
}

impl Default for Expose {
    fn default() -> Self {
        Self {
            channels: true,
            private_messages: true,
        }
    }
}

pub fn config(expose: Expose) -> Config {
    let toml = format!(
        r##"
[homeserver]
url = "{HS_URL}"
domain = "{HS_DOMAIN}"

[appservice]
hs_token = "{HS_TOKEN}"
as_token = "as-secret"
url = "http://localhost:9999"
port = 0
bind = "127.0.0.1"

[servers."{SERVER}"]
nick = "{BOT_NICK}"

[servers."{SERVER}".expose]
channels = {}
private_messages = {}

[servers."{SERVER}".rooms.mappings]
"{CHANNEL}" = ["{ROOM_ID}"]
"##,
        expose.channels, expose.private_messages
    );
    Config::parse(&toml).expect("test config parses")
}

/// A bridge wired to fresh fakes.
pub struct Harness {
    pub bridge: Arc<Bridge>,
    pub irc: FakeIrc,
    pub matrix: FakeMatrix,
    pub journal: Arc<Journal>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_expose(Expose::default())
    }

    pub fn with_expose(expose: Expose) -> Self {
        let journal = Arc::new(Journal::default());
        let irc = FakeIrc::new(Arc::clone(&journal));
        let matrix = FakeMatrix::new(Arc::clone(&journal));
        let bridge = Arc::new(Bridge::new(
            config(expose),
            Arc::new(irc.clone()),
            Arc::new(matrix.clone()),
        ));
        Self {
            bridge,
            irc,
            matrix,
            journal,
        }
    }
}

pub fn event(value: Value) -> RawEvent {
    serde_json::from_value(value).expect("test event parses")
}

/// An `m.room.message` from [`USER_ID`] in [`ROOM_ID`].
pub fn message(content: Value) -> RawEvent {
    event(json!({
        "type": "m.room.message",
        "content": content,
        "user_id": USER_ID,
        "room_id": ROOM_ID,
    }))
}

pub fn virtual_user(nick: &str) -> String {
    format!("@{SERVER}_{nick}:{HS_DOMAIN}")
}
