//! Per-client actor.
//!
//! The actor owns one IRC connection and handles its mailbox one event at a
//! time, so a request that arrives while a connect or join is in flight
//! waits behind it and sees the outcome. Requests are answered through
//! oneshot replies; the current state is published on a `watch` channel.
//!
//! When the transport fails, everything still queued in the mailbox that
//! depends on the failed step is answered with `ConnectionFailed` and the
//! actor returns to [`ClientState::Disconnected`]. The next request starts
//! a fresh connection.

use super::{IrcAction, Target};
use crate::config::IrcServerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::irc::{IrcConnection, IrcConnector, IrcError};
use crate::metrics;
use crate::telemetry;
use slirc_proto::irc_to_lower;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, info, warn};

/// Mailbox capacity per client.
const MAILBOX_CAPACITY: usize = 100;

/// Observable lifecycle of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    /// Registered; `joined` lists case-folded channel names.
    Connected { joined: Vec<String> },
}

impl ClientState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        match self {
            Self::Connected { joined } => joined.contains(&irc_to_lower(channel)),
            _ => false,
        }
    }
}

type Reply<T> = oneshot::Sender<BridgeResult<T>>;

/// Requests handled by a client actor.
enum ClientEvent {
    Connect { reply_tx: Reply<()> },
    Join { channel: String, reply_tx: Reply<()> },
    Send { target: Target, action: IrcAction, reply_tx: Reply<()> },
    Whois { nick: String, reply_tx: Reply<bool> },
}

impl ClientEvent {
    /// Channel this request needs to be joined to, if any.
    fn channel(&self) -> Option<&str> {
        match self {
            Self::Join { channel, .. } => Some(channel),
            Self::Send { target, .. } => target.channel(),
            Self::Connect { .. } | Self::Whois { .. } => None,
        }
    }

    fn fail(self, err: BridgeError) {
        match self {
            Self::Connect { reply_tx } | Self::Join { reply_tx, .. } | Self::Send { reply_tx, .. } => {
                let _ = reply_tx.send(Err(err));
            }
            Self::Whois { reply_tx, .. } => {
                let _ = reply_tx.send(Err(err));
            }
        }
    }
}

/// Cloneable handle to a client actor.
#[derive(Clone)]
pub struct ClientHandle {
    server_id: Arc<str>,
    nick: Arc<str>,
    tx: mpsc::Sender<ClientEvent>,
    state_rx: watch::Receiver<ClientState>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("server_id", &self.server_id)
            .field("nick", &self.nick)
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

impl ClientHandle {
    /// Spawn the actor for `nick` on `server`.
    pub(crate) fn spawn(
        server: Arc<IrcServerConfig>,
        nick: String,
        connector: Arc<dyn IrcConnector>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let span = telemetry::irc_client(&server.id, &nick);

        let handle = Self {
            server_id: Arc::from(server.id.as_str()),
            nick: Arc::from(nick.as_str()),
            tx,
            state_rx,
        };

        let actor = ClientActor {
            server,
            nick,
            connector,
            conn: None,
            joined: BTreeSet::new(),
            backlog: VecDeque::new(),
            state_tx,
        };
        tokio::spawn(actor.run(rx).instrument(span));

        handle
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ClientState {
        self.state_rx.borrow().clone()
    }

    /// Connect if not already connected.
    pub async fn connect(&self) -> BridgeResult<()> {
        self.request(|reply_tx| ClientEvent::Connect { reply_tx }).await
    }

    /// Join a channel. Resolves immediately when already joined.
    pub async fn join(&self, channel: &str) -> BridgeResult<()> {
        let channel = channel.to_string();
        self.request(|reply_tx| ClientEvent::Join { channel, reply_tx }).await
    }

    /// Deliver an action. Channel targets are joined first.
    pub async fn send(&self, target: Target, action: IrcAction) -> BridgeResult<()> {
        self.request(|reply_tx| ClientEvent::Send {
            target,
            action,
            reply_tx,
        })
        .await
    }

    /// WHOIS through this client.
    pub async fn whois(&self, nick: &str) -> BridgeResult<bool> {
        let nick = nick.to_string();
        self.request(|reply_tx| ClientEvent::Whois { nick, reply_tx }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> ClientEvent) -> BridgeResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| self.actor_gone())?;
        reply_rx.await.map_err(|_| self.actor_gone())?
    }

    fn actor_gone(&self) -> BridgeError {
        BridgeError::Internal(format!("IRC client actor for {} on {} stopped", self.nick, self.server_id))
    }
}

struct ClientActor {
    server: Arc<IrcServerConfig>,
    nick: String,
    connector: Arc<dyn IrcConnector>,
    conn: Option<Arc<dyn IrcConnection>>,
    /// Case-folded channels joined on the current connection.
    joined: BTreeSet<String>,
    /// Requests pulled off the mailbox while failing a step but not
    /// affected by the failure. Served before the mailbox.
    backlog: VecDeque<ClientEvent>,
    state_tx: watch::Sender<ClientState>,
}

impl ClientActor {
    async fn run(mut self, mut rx: mpsc::Receiver<ClientEvent>) {
        loop {
            let event = match self.backlog.pop_front() {
                Some(event) => event,
                None => match rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle_event(event, &mut rx).await;
        }
        debug!("IRC client actor stopped");
    }

    async fn handle_event(&mut self, event: ClientEvent, rx: &mut mpsc::Receiver<ClientEvent>) {
        match event {
            ClientEvent::Connect { reply_tx } => {
                let result = self.ensure_connected(rx).await.map(|_| ());
                let _ = reply_tx.send(result);
            }
            ClientEvent::Join { channel, reply_tx } => {
                let result = self.ensure_joined(&channel, rx).await.map(|_| ());
                let _ = reply_tx.send(result);
            }
            ClientEvent::Send {
                target,
                action,
                reply_tx,
            } => {
                let result = self.deliver(&target, &action, rx).await;
                let _ = reply_tx.send(result);
            }
            ClientEvent::Whois { nick, reply_tx } => {
                let result = self.whois(&nick, rx).await;
                let _ = reply_tx.send(result);
            }
        }
    }

    async fn ensure_connected(
        &mut self,
        rx: &mut mpsc::Receiver<ClientEvent>,
    ) -> BridgeResult<Arc<dyn IrcConnection>> {
        if let Some(conn) = &self.conn {
            if conn.is_alive() {
                return Ok(Arc::clone(conn));
            }
            warn!("IRC connection lost, reconnecting");
            self.reset();
        }

        self.publish(ClientState::Connecting);
        match self.connector.connect(&self.server, &self.nick).await {
            Ok(conn) => {
                info!("IRC client connected");
                self.conn = Some(Arc::clone(&conn));
                self.publish_connected();
                Ok(conn)
            }
            Err(e) => Err(self.connection_lost(&e, rx)),
        }
    }

    async fn ensure_joined(
        &mut self,
        channel: &str,
        rx: &mut mpsc::Receiver<ClientEvent>,
    ) -> BridgeResult<Arc<dyn IrcConnection>> {
        let conn = self.ensure_connected(rx).await?;
        let key = irc_to_lower(channel);
        if self.joined.contains(&key) {
            return Ok(conn);
        }

        match conn.join(channel).await {
            Ok(()) => {
                info!(channel = %channel, "Joined IRC channel");
                self.joined.insert(key);
                self.publish_connected();
                Ok(conn)
            }
            Err(e) if !conn.is_alive() => Err(self.connection_lost(&e, rx)),
            Err(e) => {
                warn!(channel = %channel, error = %e, "IRC join failed");
                let err = self.failure(&e);
                self.fail_queued(rx, &e, |event| {
                    event.channel().is_some_and(|c| irc_to_lower(c) == key)
                });
                Err(err)
            }
        }
    }

    async fn deliver(
        &mut self,
        target: &Target,
        action: &IrcAction,
        rx: &mut mpsc::Receiver<ClientEvent>,
    ) -> BridgeResult<()> {
        let conn = match target {
            Target::Channel(channel) => self.ensure_joined(channel, rx).await?,
            Target::Nick(_) => self.ensure_connected(rx).await?,
        };

        let to = target.as_str();
        let result = match action {
            IrcAction::Say(text) => conn.say(to, text).await,
            IrcAction::Act(text) => conn.action(to, text).await,
            IrcAction::CtcpNotice(text) => conn.ctcp(to, "notice", text).await,
            IrcAction::Topic(topic) => conn.topic(to, topic).await,
        };

        match result {
            Ok(()) => {
                debug!(target = %to, action = action.kind(), "IRC action sent");
                metrics::record_irc_action(action.kind());
                Ok(())
            }
            Err(e) if !conn.is_alive() => Err(self.connection_lost(&e, rx)),
            Err(e) => {
                warn!(target = %to, error = %e, "IRC action refused");
                Err(self.failure(&e))
            }
        }
    }

    async fn whois(&mut self, nick: &str, rx: &mut mpsc::Receiver<ClientEvent>) -> BridgeResult<bool> {
        let conn = self.ensure_connected(rx).await?;
        match conn.whois(nick).await {
            Ok(exists) => Ok(exists),
            Err(e) if !conn.is_alive() => Err(self.connection_lost(&e, rx)),
            Err(e) => Err(self.failure(&e)),
        }
    }

    /// The connection is unusable: fail everything queued and reset.
    fn connection_lost(&mut self, e: &IrcError, rx: &mut mpsc::Receiver<ClientEvent>) -> BridgeError {
        warn!(error = %e, "IRC connection failed");
        let err = self.failure(e);
        self.fail_queued(rx, e, |_| true);
        self.reset();
        err
    }

    /// Fail queued requests matching `affected`; keep the rest in order.
    fn fail_queued(
        &mut self,
        rx: &mut mpsc::Receiver<ClientEvent>,
        e: &IrcError,
        affected: impl Fn(&ClientEvent) -> bool,
    ) {
        let mut queued: VecDeque<ClientEvent> = self.backlog.drain(..).collect();
        while let Ok(event) = rx.try_recv() {
            queued.push_back(event);
        }

        let mut failed = 0usize;
        for event in queued {
            if affected(&event) {
                event.fail(self.failure(e));
                failed += 1;
            } else {
                self.backlog.push_back(event);
            }
        }
        if failed > 0 {
            debug!(failed, "Failed queued IRC requests");
        }
    }

    fn failure(&self, e: &IrcError) -> BridgeError {
        BridgeError::ConnectionFailed {
            server: self.server.id.clone(),
            nick: self.nick.clone(),
            reason: e.to_string(),
        }
    }

    fn reset(&mut self) {
        self.conn = None;
        self.joined.clear();
        self.publish(ClientState::Disconnected);
    }

    fn publish_connected(&self) {
        self.publish(ClientState::Connected {
            joined: self.joined.iter().cloned().collect(),
        });
    }

    fn publish(&self, state: ClientState) {
        self.state_tx.send_replace(state);
    }
}
