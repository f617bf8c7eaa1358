//! Provisioning flows.
//!
//! Each flow is a fixed sequence of steps. A failing step stops the flow
//! and the error is tagged with that [`FlowStep`]. Nothing is rolled back.
//!
//! - invite: WHOIS, register, join, read state, reconcile membership
//! - alias query: create the room and join the bot to the channel
//! - user query: WHOIS, register

use super::Bridge;
use crate::error::{BridgeError, BridgeResult, FlowResultExt, FlowStep};
use crate::identity::{VirtualIdentity, alias_localpart_for};
use crate::matrix::{CreateRoomOptions, Membership, RegisterRequest, StateEvent, Visibility};
use crate::state::{IrcChannel, PmRoom};
use crate::telemetry;
use tracing::{Instrument, debug, info};

/// `errcode` for a registration whose user already exists.
const USER_IN_USE: &str = "M_USER_IN_USE";

impl Bridge {
    /// Bring a virtual user into the room that invited it.
    ///
    /// On success the room becomes a PM room between `inviter` and the nick.
    pub async fn invite_flow(&self, room_id: &str, inviter: &str, invitee: &str) -> BridgeResult<()> {
        self.run_invite(room_id, inviter, invitee)
            .instrument(telemetry::flow("invite", invitee))
            .await
    }

    /// Provision the room behind `#{server}_{channel}:{domain}`.
    ///
    /// Room creation and the bot's channel join run concurrently; the flow
    /// succeeds when both do, and only then is the mapping recorded.
    pub async fn alias_query(&self, alias: &str) -> BridgeResult<String> {
        self.run_alias_query(alias)
            .instrument(telemetry::flow("alias_query", alias))
            .await
    }

    /// Provision a virtual user the homeserver asked about.
    pub async fn user_query(&self, user_id: &str) -> BridgeResult<()> {
        self.run_user_query(user_id)
            .instrument(telemetry::flow("user_query", user_id))
            .await
    }

    async fn run_invite(&self, room_id: &str, inviter: &str, invitee: &str) -> BridgeResult<()> {
        let identity = self.identities.parse(invitee).at_step(FlowStep::Resolve)?;
        let server = self.server(&identity.server_id).at_step(FlowStep::Resolve)?;
        if !server.expose.private_messages {
            return Err(BridgeError::NotExposed(format!(
                "private messages on {}",
                identity.server_id
            ))
            .at(FlowStep::Resolve));
        }

        self.require_online(&identity).await.at_step(FlowStep::Whois)?;
        let user_id = self.ensure_registered(&identity).await.at_step(FlowStep::Register)?;

        self.matrix
            .join_room(room_id, Some(&user_id))
            .await
            .at_step(FlowStep::JoinRoom)?;
        let state = self
            .matrix
            .room_state(room_id, Some(&user_id))
            .await
            .at_step(FlowStep::RoomState)?;
        reconcile(&state, &[user_id.as_str(), inviter]).at_step(FlowStep::Reconcile)?;

        self.rooms.set_pm_room(
            room_id,
            PmRoom {
                server_id: identity.server_id.clone(),
                nick: identity.nick.clone(),
                matrix_user: inviter.to_string(),
            },
        );
        info!(room_id = %room_id, nick = %identity.nick, "PM room provisioned");
        Ok(())
    }

    async fn run_alias_query(&self, alias: &str) -> BridgeResult<String> {
        let (server_id, channel) = self.identities.parse_alias(alias).at_step(FlowStep::Resolve)?;
        if !self.server(&server_id).at_step(FlowStep::Resolve)?.expose.channels {
            return Err(
                BridgeError::NotExposed(format!("channels on {server_id}")).at(FlowStep::Resolve)
            );
        }

        let options = CreateRoomOptions {
            room_alias_name: alias_localpart_for(&server_id, &channel),
            name: Some(channel.clone()),
            visibility: Visibility::Public,
        };
        let create = async { self.matrix.create_room(&options).await.at_step(FlowStep::CreateRoom) };
        let join = async {
            let bot = self.pool.bot_client(&server_id).await?;
            self.pool.join_channel(&bot, &channel).await
        };
        let (room_id, _) = tokio::try_join!(create, async {
            join.await.at_step(FlowStep::JoinChannel)
        })?;

        self.rooms.insert(&IrcChannel::new(&server_id, &channel), &room_id);
        info!(alias = %alias, room_id = %room_id, channel = %channel, "Channel room provisioned");
        Ok(room_id)
    }

    async fn run_user_query(&self, user_id: &str) -> BridgeResult<()> {
        let identity = self.identities.parse(user_id).at_step(FlowStep::Resolve)?;
        self.server(&identity.server_id).at_step(FlowStep::Resolve)?;
        self.require_online(&identity).await.at_step(FlowStep::Whois)?;
        self.ensure_registered(&identity).await.at_step(FlowStep::Register)?;
        Ok(())
    }

    /// WHOIS through the bot; a nick that is not online is an error.
    async fn require_online(&self, identity: &VirtualIdentity) -> BridgeResult<()> {
        let bot = self.pool.bot_client(&identity.server_id).await?;
        if bot.whois(&identity.nick).await? {
            Ok(())
        } else {
            Err(BridgeError::NoSuchNick {
                server: identity.server_id.clone(),
                nick: identity.nick.clone(),
            })
        }
    }

    /// Register the virtual user unless it is already known to exist.
    async fn ensure_registered(&self, identity: &VirtualIdentity) -> BridgeResult<String> {
        let user_id = identity.user_id(self.identities.domain());
        if self.rooms.is_registered(&user_id) {
            debug!(user_id = %user_id, "Virtual user already registered");
            return Ok(user_id);
        }

        let registered = match self
            .matrix
            .register(&RegisterRequest::appservice(identity.localpart()))
            .await
        {
            Ok(registered) => registered,
            Err(e) if e.errcode() == Some(USER_IN_USE) => user_id,
            Err(e) => return Err(e),
        };
        self.rooms.mark_registered(&registered);
        Ok(registered)
    }
}

/// Check that every user in `expected` is joined according to `state`.
fn reconcile(state: &[StateEvent], expected: &[&str]) -> BridgeResult<()> {
    for user in expected {
        let joined = state
            .iter()
            .any(|ev| ev.state_key == *user && ev.membership() == Some(Membership::Join));
        if !joined {
            return Err(BridgeError::NotJoined((*user).to_string()));
        }
    }
    Ok(())
}
