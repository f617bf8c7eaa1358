//! Matrix event router.
//!
//! Turns one inbound room event into IRC actions on the pool. Messages are
//! sent by the sender's own IRC client, except media which the bot posts as
//! `<name> <url>` text. Invites for virtual users start the invite flow.

use super::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::format;
use crate::matrix::{
    MessageContent, Membership, ROOM_MEMBER, ROOM_MESSAGE, ROOM_TOPIC, RawEvent, RoomEvent,
    mxc_to_http,
};
use crate::metrics;
use crate::pool::{ClientOwner, IrcAction, Target};
use crate::telemetry;
use futures_util::future::join_all;
use tracing::{Instrument, debug, warn};

/// Who an action is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sender<'a> {
    /// The Matrix user's own IRC client.
    User(&'a str),
    /// The network's bridge bot.
    Bot,
}

/// One destination on one network.
#[derive(Debug)]
struct Delivery {
    server_id: String,
    target: Target,
}

impl Bridge {
    /// Route one event, catching and reporting any failure.
    ///
    /// Errors never propagate past here, so one bad event cannot affect the
    /// others in a transaction.
    pub async fn dispatch(&self, event: RawEvent) {
        let sender = event.sender().unwrap_or("<unknown>").to_string();
        let span = telemetry::event(&event.event_type, &event.room_id, &sender);
        async {
            metrics::record_event(event_label(&event.event_type));
            if let Err(e) = self.handle(&event).await {
                metrics::record_error(e.error_code());
                warn!(
                    error = %e,
                    step = e.step().map(|s| s.as_str()),
                    "Failed to bridge Matrix event"
                );
            }
        }
        .instrument(span)
        .await
    }

    /// Route one event.
    pub async fn handle(&self, event: &RawEvent) -> BridgeResult<()> {
        let sender = event.sender()?;
        if self.identities.is_virtual(sender) {
            debug!(sender = %sender, "Ignoring event from a virtual user");
            return Ok(());
        }

        match event.parse()? {
            RoomEvent::Message(content) => self.on_message(&event.room_id, sender, content).await,
            RoomEvent::Topic { topic } => self.on_topic(&event.room_id, sender, topic).await,
            RoomEvent::Member {
                membership,
                state_key,
            } => self.on_member(&event.room_id, sender, membership, &state_key).await,
            RoomEvent::Other => Ok(()),
        }
    }

    async fn on_message(&self, room_id: &str, sender: &str, content: MessageContent) -> BridgeResult<()> {
        let (action, from) = match content {
            MessageContent::Text(text) => (
                IrcAction::Say(format::encode(&text.body, text.html())),
                Sender::User(sender),
            ),
            MessageContent::Emote(text) => (IrcAction::Act(text.body), Sender::User(sender)),
            MessageContent::Notice(text) => (IrcAction::CtcpNotice(text.body), Sender::User(sender)),
            MessageContent::Image(media)
            | MessageContent::File(media)
            | MessageContent::Video(media)
            | MessageContent::Audio(media) => {
                let url = media
                    .url
                    .as_deref()
                    .and_then(|mxc| mxc_to_http(&self.config.homeserver.url, mxc));
                let text = match url {
                    Some(url) => format!("{} {url}", media.body),
                    None => media.body,
                };
                (IrcAction::Say(text), Sender::Bot)
            }
            MessageContent::Unknown => {
                debug!(room_id = %room_id, "Ignoring unsupported msgtype");
                return Ok(());
            }
        };

        let deliveries = self.message_targets(room_id)?;
        self.deliver(deliveries, from, action).await
    }

    async fn on_topic(&self, room_id: &str, sender: &str, topic: String) -> BridgeResult<()> {
        let deliveries = self.channel_targets(room_id);
        self.deliver(deliveries, Sender::User(sender), IrcAction::Topic(topic))
            .await
    }

    async fn on_member(
        &self,
        room_id: &str,
        sender: &str,
        membership: Membership,
        state_key: &str,
    ) -> BridgeResult<()> {
        if membership == Membership::Invite && self.identities.is_virtual(state_key) {
            return self.invite_flow(room_id, sender, state_key).await;
        }
        debug!(room_id = %room_id, state_key = %state_key, ?membership, "Ignoring membership change");
        Ok(())
    }

    /// PM peer if this is a PM room, otherwise the bridged channels.
    fn message_targets(&self, room_id: &str) -> BridgeResult<Vec<Delivery>> {
        let Some(pm) = self.rooms.pm_room(room_id) else {
            return Ok(self.channel_targets(room_id));
        };
        if !self.server(&pm.server_id)?.expose.private_messages {
            return Err(BridgeError::NotExposed(format!(
                "private messages on {}",
                pm.server_id
            )));
        }
        Ok(vec![Delivery {
            server_id: pm.server_id,
            target: Target::Nick(pm.nick),
        }])
    }

    fn channel_targets(&self, room_id: &str) -> Vec<Delivery> {
        self.rooms
            .channels_for_room(room_id)
            .into_iter()
            .map(|c| Delivery {
                server_id: c.server_id,
                target: Target::Channel(c.channel),
            })
            .collect()
    }

    /// Send `action` to every delivery concurrently. The first failure is
    /// returned after all have finished.
    async fn deliver(&self, deliveries: Vec<Delivery>, from: Sender<'_>, action: IrcAction) -> BridgeResult<()> {
        if deliveries.is_empty() {
            debug!("Room is not bridged");
            return Ok(());
        }

        let sends = deliveries.into_iter().map(|delivery| {
            let action = action.clone();
            async move {
                let owner = match from {
                    Sender::User(user_id) => ClientOwner::user(user_id),
                    Sender::Bot => ClientOwner::Bot,
                };
                let handle = self.pool.client(&delivery.server_id, &owner)?;
                self.pool.send(&handle, delivery.target, action).await
            }
        });

        join_all(sends).await.into_iter().collect()
    }
}

/// Bounded metric label for an event type.
fn event_label(event_type: &str) -> &'static str {
    match event_type {
        ROOM_MESSAGE => ROOM_MESSAGE,
        ROOM_TOPIC => ROOM_TOPIC,
        ROOM_MEMBER => ROOM_MEMBER,
        _ => "other",
    }
}
