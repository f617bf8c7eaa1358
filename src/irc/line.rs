//! Plaintext TCP IRC client.
//!
//! Each connection runs a reader task and a writer task. Outbound lines are
//! built as [`Message`]s and framed by [`IrcCodec`]; every parameter goes
//! through [`one_line`] first, so text from Matrix can never start a second
//! command. Requests that expect a server reply (registration, JOIN, WHOIS)
//! park a oneshot in [`Pending`] which the reader resolves when the matching
//! reply arrives.
//!
//! The reader only holds a weak sender: dropping the [`LineConnection`]
//! ends the writer, which shuts both halves of the socket down.

use super::{IrcConnection, IrcConnector, IrcError};
use crate::config::IrcServerConfig;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use slirc_proto::format::is_illegal_control_char;
use slirc_proto::{ChannelExt, Command, Ctcp, CtcpKind, IrcCodec, Message, Response, irc_eq, irc_to_lower};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time allowed for TCP connect and for the server's welcome.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for a JOIN echo or a WHOIS to complete.
const REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest line accepted from the server.
const MAX_LINE_LENGTH: usize = 8192;

/// Outbound messages buffered per connection.
const OUTBOUND_QUEUE: usize = 256;

/// Replies that refuse a JOIN; the channel is the second parameter.
const JOIN_FAILURES: &[Response] = &[
    Response::ERR_NOSUCHCHANNEL,
    Response::ERR_TOOMANYCHANNELS,
    Response::ERR_CHANNELISFULL,
    Response::ERR_INVITEONLYCHAN,
    Response::ERR_BANNEDFROMCHAN,
    Response::ERR_BADCHANNELKEY,
    Response::ERR_NEEDREGGEDNICK,
];

/// Replies that refuse our nick during registration.
const NICK_FAILURES: &[Response] = &[
    Response::ERR_ERRONEOUSNICKNAME,
    Response::ERR_NICKNAMEINUSE,
    Response::ERR_NICKCOLLISION,
];

type Reply<T> = oneshot::Sender<Result<T, IrcError>>;

/// Flatten `text` into one parameter: line breaks become spaces, NUL and
/// control characters the codec refuses are dropped. Formatting codes stay.
pub fn one_line(text: &str) -> String {
    text.replace("\r\n", " ")
        .chars()
        .filter_map(|c| match c {
            '\r' | '\n' => Some(' '),
            '\0' => None,
            c if is_illegal_control_char(c) => None,
            c => Some(c),
        })
        .collect()
}

/// A nick or channel used as a middle parameter.
fn target_param(target: &str) -> Result<String, IrcError> {
    let valid = !target.is_empty()
        && !target.starts_with(':')
        && !target.contains(|c: char| c == ' ' || c == ',' || c.is_control());
    if valid {
        Ok(target.to_string())
    } else {
        Err(IrcError::InvalidTarget(target.to_string()))
    }
}

fn channel_param(channel: &str) -> Result<String, IrcError> {
    if channel.is_channel_name() {
        Ok(channel.to_string())
    } else {
        Err(IrcError::InvalidTarget(channel.to_string()))
    }
}

#[derive(Default)]
struct WhoisQuery {
    exists: bool,
    waiters: Vec<Reply<bool>>,
}

/// Requests waiting on a server reply.
#[derive(Default)]
struct Pending {
    welcome: Option<Reply<()>>,
    /// Lowercased channel -> waiters.
    joins: HashMap<String, Vec<Reply<()>>>,
    /// Lowercased nick -> query in progress.
    whois: HashMap<String, WhoisQuery>,
}

struct Shared {
    nick: String,
    alive: AtomicBool,
    pending: Mutex<Pending>,
    /// Cancelled when either task stops.
    shutdown: CancellationToken,
}

impl Shared {
    fn handle_message(&self, msg: &Message) {
        match &msg.command {
            Command::JOIN(channel, _, _) => {
                if !msg.source_nickname().is_some_and(|n| irc_eq(n, &self.nick)) {
                    return;
                }
                let waiters = self.pending.lock().joins.remove(&irc_to_lower(channel));
                for waiter in waiters.unwrap_or_default() {
                    let _ = waiter.send(Ok(()));
                }
            }
            Command::Response(response, args) => self.handle_reply(*response, args),
            _ => {}
        }
    }

    fn handle_reply(&self, response: Response, args: &[String]) {
        let mut pending = self.pending.lock();
        let subject = args.get(1).map(|s| irc_to_lower(s)).unwrap_or_default();
        let rejected = || IrcError::Rejected {
            code: response.code(),
            text: args.last().cloned().unwrap_or_default(),
        };

        match response {
            Response::RPL_WELCOME => {
                if let Some(welcome) = pending.welcome.take() {
                    let _ = welcome.send(Ok(()));
                }
            }
            r if NICK_FAILURES.contains(&r) => {
                if let Some(welcome) = pending.welcome.take() {
                    let _ = welcome.send(Err(rejected()));
                }
            }
            r if JOIN_FAILURES.contains(&r) => {
                for waiter in pending.joins.remove(&subject).unwrap_or_default() {
                    let _ = waiter.send(Err(rejected()));
                }
            }
            Response::RPL_WHOISUSER => {
                if let Some(query) = pending.whois.get_mut(&subject) {
                    query.exists = true;
                }
            }
            Response::ERR_NOSUCHNICK => {
                if let Some(query) = pending.whois.get_mut(&subject) {
                    query.exists = false;
                }
            }
            Response::RPL_ENDOFWHOIS => {
                if let Some(query) = pending.whois.remove(&subject) {
                    for waiter in query.waiters {
                        let _ = waiter.send(Ok(query.exists));
                    }
                }
            }
            _ => {}
        }
    }

    /// Mark the connection dead, stop both tasks and fail everything still
    /// waiting.
    fn close(&self) {
        self.shutdown.cancel();
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut pending = self.pending.lock();
        if let Some(welcome) = pending.welcome.take() {
            let _ = welcome.send(Err(IrcError::Closed));
        }
        for (_, waiters) in pending.joins.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(IrcError::Closed));
            }
        }
        for (_, query) in pending.whois.drain() {
            for waiter in query.waiters {
                let _ = waiter.send(Err(IrcError::Closed));
            }
        }
    }
}

/// Connects over plaintext TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    realname: String,
}

impl TcpConnector {
    pub fn new(realname: impl Into<String>) -> Self {
        Self {
            realname: realname.into(),
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new("Matrix IRC bridge")
    }
}

#[async_trait]
impl IrcConnector for TcpConnector {
    async fn connect(
        &self,
        server: &IrcServerConfig,
        nick: &str,
    ) -> Result<Arc<dyn IrcConnection>, IrcError> {
        let nick = target_param(nick)?;
        let codec = IrcCodec::new("utf-8")?;
        let addr = server.address();
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| IrcError::Timeout("connect"))??;
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            nick: nick.clone(),
            alive: AtomicBool::new(true),
            pending: Mutex::new(Pending::default()),
            shutdown: CancellationToken::new(),
        });
        let (welcome_tx, welcome_rx) = oneshot::channel();
        shared.pending.lock().welcome = Some(welcome_tx);

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let writer = FramedWrite::new(write_half, codec);
        tokio::spawn(write_loop(writer, out_rx, Arc::clone(&shared)));
        tokio::spawn(read_loop(read_half, out_tx.downgrade(), Arc::clone(&shared)));

        let conn = LineConnection { out_tx, shared };
        conn.write(Message::nick(nick.as_str())).await?;
        conn.write(Message::user(nick.as_str(), one_line(&self.realname)))
            .await?;

        match timeout(CONNECT_TIMEOUT, welcome_rx).await {
            Err(_) => return Err(IrcError::Timeout("welcome")),
            Ok(Err(_)) => return Err(IrcError::Closed),
            Ok(Ok(result)) => result?,
        }

        info!(server = %server.id, addr = %addr, nick = %nick, "IRC connection registered");
        Ok(Arc::new(conn))
    }
}

async fn read_loop(read_half: OwnedReadHalf, out_tx: mpsc::WeakSender<Message>, shared: Arc<Shared>) {
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let frame = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            frame = lines.next() => frame,
        };
        let raw = match frame {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                warn!(nick = %shared.nick, error = %e, "IRC read failed");
                break;
            }
            None => break,
        };
        let msg = match raw.parse::<Message>() {
            Ok(msg) => msg,
            Err(e) => {
                debug!(nick = %shared.nick, line = %raw, error = %e, "Unparseable IRC line");
                continue;
            }
        };
        match &msg.command {
            Command::PING(token, _) => {
                let Some(out_tx) = out_tx.upgrade() else {
                    break;
                };
                if out_tx.send(Message::pong(one_line(token))).await.is_err() {
                    break;
                }
            }
            Command::ERROR(reason) => {
                warn!(nick = %shared.nick, reason = %reason, "IRC server closed link");
                break;
            }
            _ => shared.handle_message(&msg),
        }
    }
    shared.close();
}

async fn write_loop(
    mut writer: FramedWrite<OwnedWriteHalf, IrcCodec>,
    mut rx: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
) {
    loop {
        let msg = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        if let Err(e) = writer.send(msg).await {
            warn!(nick = %shared.nick, error = %e, "IRC write failed");
            break;
        }
    }
    shared.close();
}

/// A registered connection.
pub struct LineConnection {
    out_tx: mpsc::Sender<Message>,
    shared: Arc<Shared>,
}

impl LineConnection {
    async fn write(&self, msg: Message) -> Result<(), IrcError> {
        if !self.is_alive() {
            return Err(IrcError::Closed);
        }
        self.out_tx.send(msg).await.map_err(|_| IrcError::Closed)
    }

    async fn await_reply<T>(
        &self,
        rx: oneshot::Receiver<Result<T, IrcError>>,
        what: &'static str,
    ) -> Result<T, IrcError> {
        match timeout(REPLY_TIMEOUT, rx).await {
            Err(_) => Err(IrcError::Timeout(what)),
            Ok(Err(_)) => Err(IrcError::Closed),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl IrcConnection for LineConnection {
    fn nick(&self) -> &str {
        &self.shared.nick
    }

    fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    async fn join(&self, channel: &str) -> Result<(), IrcError> {
        let channel = channel_param(channel)?;
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .joins
            .entry(irc_to_lower(&channel))
            .or_default()
            .push(tx);
        self.write(Message::join(channel)).await?;
        self.await_reply(rx, "JOIN").await
    }

    /// One PRIVMSG per line of `text`.
    async fn say(&self, target: &str, text: &str) -> Result<(), IrcError> {
        let target = target_param(target)?;
        for part in text.split(['\r', '\n']).filter(|p| !p.is_empty()) {
            self.write(Message::privmsg(target.as_str(), one_line(part))).await?;
        }
        Ok(())
    }

    async fn action(&self, target: &str, text: &str) -> Result<(), IrcError> {
        let target = target_param(target)?;
        let text = one_line(text);
        self.write(Message::privmsg(target, Ctcp::action(&text).to_string()))
            .await
    }

    async fn ctcp(&self, target: &str, kind: &str, text: &str) -> Result<(), IrcError> {
        let target = target_param(target)?;
        let text = one_line(text);
        let (command, params) = match text.split_once(' ') {
            Some((command, params)) => (command, Some(params)),
            None => (text.as_str(), None),
        };
        let body = Ctcp {
            kind: CtcpKind::parse(command),
            params,
        }
        .to_string();
        let msg = if kind.eq_ignore_ascii_case("notice") {
            Message::notice(target, body)
        } else {
            Message::privmsg(target, body)
        };
        self.write(msg).await
    }

    async fn topic(&self, channel: &str, topic: &str) -> Result<(), IrcError> {
        let channel = channel_param(channel)?;
        self.write(Command::TOPIC(channel, Some(one_line(topic))).into())
            .await
    }

    async fn whois(&self, nick: &str) -> Result<bool, IrcError> {
        let nick = target_param(nick)?;
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .whois
            .entry(irc_to_lower(&nick))
            .or_default()
            .waiters
            .push(tx);
        self.write(Command::WHOIS(None, nick).into()).await?;
        self.await_reply(rx, "WHOIS").await
    }
}
