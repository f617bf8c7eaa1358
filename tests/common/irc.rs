//! Fake IRC transport.
//!
//! Every connection succeeds and every channel can be joined unless the test
//! says otherwise. Joins can be held open with [`FakeIrc::hold_joins`] to
//! observe what the bridge does while a join is pending.

use super::Journal;
use async_trait::async_trait;
use matrix_irc_bridge::config::IrcServerConfig;
use matrix_irc_bridge::irc::{IrcConnection, IrcConnector, IrcError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One call made on a fake connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcCall {
    pub server: String,
    /// Nick of the connection the call was made on.
    pub nick: String,
    pub kind: &'static str,
    pub args: Vec<String>,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<IrcCall>>,
    online: Mutex<HashSet<String>>,
    refused_channels: Mutex<HashSet<String>>,
    join_gate: Mutex<Option<Arc<Semaphore>>>,
}

#[derive(Clone)]
pub struct FakeIrc {
    inner: Arc<Inner>,
    journal: Arc<Journal>,
}

impl FakeIrc {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            journal,
        }
    }

    /// Make `nick` answer WHOIS.
    pub fn set_online(&self, nick: &str) {
        self.inner.online.lock().insert(nick.to_string());
    }

    /// Refuse joins to `channel`.
    pub fn refuse_channel(&self, channel: &str) {
        self.inner.refused_channels.lock().insert(channel.to_string());
    }

    /// Hold every join until a permit is added to the returned semaphore.
    pub fn hold_joins(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.join_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<IrcCall> {
        self.inner.calls.lock().clone()
    }

    /// Calls of one kind.
    pub fn calls_of(&self, kind: &str) -> Vec<IrcCall> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    fn record(&self, server: &str, nick: &str, kind: &'static str, args: &[&str]) {
        let call = IrcCall {
            server: server.to_string(),
            nick: nick.to_string(),
            kind,
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        self.inner.calls.lock().push(call);
        self.journal
            .record(format!("irc {nick} {kind} {}", args.join(" ")).trim_end().to_string());
    }
}

#[async_trait]
impl IrcConnector for FakeIrc {
    async fn connect(
        &self,
        server: &IrcServerConfig,
        nick: &str,
    ) -> Result<Arc<dyn IrcConnection>, IrcError> {
        self.record(&server.id, nick, "connect", &[]);
        Ok(Arc::new(FakeConnection {
            server: server.id.clone(),
            nick: nick.to_string(),
            irc: self.clone(),
        }))
    }
}

struct FakeConnection {
    server: String,
    nick: String,
    irc: FakeIrc,
}

impl FakeConnection {
    fn record(&self, kind: &'static str, args: &[&str]) {
        self.irc.record(&self.server, &self.nick, kind, args);
    }
}

#[async_trait]
impl IrcConnection for FakeConnection {
    fn nick(&self) -> &str {
        &self.nick
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn join(&self, channel: &str) -> Result<(), IrcError> {
        let gate = self.irc.inner.join_gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire().await.map_err(|_| IrcError::Closed)?.forget();
        }
        if self.irc.inner.refused_channels.lock().contains(channel) {
            return Err(IrcError::Rejected {
                code: 474,
                text: "Cannot join channel (+b)".into(),
            });
        }
        self.record("join", &[channel]);
        Ok(())
    }

    async fn say(&self, target: &str, text: &str) -> Result<(), IrcError> {
        self.record("say", &[target, text]);
        Ok(())
    }

    async fn action(&self, target: &str, text: &str) -> Result<(), IrcError> {
        self.record("action", &[target, text]);
        Ok(())
    }

    async fn ctcp(&self, target: &str, kind: &str, text: &str) -> Result<(), IrcError> {
        self.record("ctcp", &[target, kind, text]);
        Ok(())
    }

    async fn topic(&self, channel: &str, topic: &str) -> Result<(), IrcError> {
        self.record("topic", &[channel, topic]);
        Ok(())
    }

    async fn whois(&self, nick: &str) -> Result<bool, IrcError> {
        self.record("whois", &[nick]);
        Ok(self.irc.inner.online.lock().contains(nick))
    }
}
