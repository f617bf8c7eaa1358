//! Typed Matrix room events.
//!
//! Events arrive as loose JSON. [`RawEvent`] captures the envelope and
//! [`RawEvent::parse`] turns its content into a [`RoomEvent`] the router
//! can match exhaustively.

use crate::error::{BridgeError, BridgeResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROOM_MESSAGE: &str = "m.room.message";
pub const ROOM_TOPIC: &str = "m.room.topic";
pub const ROOM_MEMBER: &str = "m.room.member";

/// The HTML dialect Matrix clients put in `formatted_body`.
pub const HTML_FORMAT: &str = "org.matrix.custom.html";

/// Event envelope as pushed by the homeserver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Legacy name for `sender`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl RawEvent {
    /// The user who sent the event.
    pub fn sender(&self) -> BridgeResult<&str> {
        self.sender
            .as_deref()
            .or(self.user_id.as_deref())
            .ok_or_else(|| BridgeError::MalformedEvent(format!("{} has no sender", self.event_type)))
    }

    /// Decode the content by event type.
    pub fn parse(&self) -> BridgeResult<RoomEvent> {
        match self.event_type.as_str() {
            ROOM_MESSAGE => self.content_as().map(RoomEvent::Message),
            ROOM_TOPIC => self
                .content_as::<TopicContent>()
                .map(|c| RoomEvent::Topic { topic: c.topic }),
            ROOM_MEMBER => {
                let content: MemberContent = self.content_as()?;
                let state_key = self.state_key.clone().ok_or_else(|| {
                    BridgeError::MalformedEvent(format!("{ROOM_MEMBER} without state_key"))
                })?;
                Ok(RoomEvent::Member {
                    membership: content.membership,
                    state_key,
                })
            }
            _ => Ok(RoomEvent::Other),
        }
    }

    fn content_as<T: DeserializeOwned>(&self) -> BridgeResult<T> {
        T::deserialize(&self.content)
            .map_err(|e| BridgeError::MalformedEvent(format!("{}: {e}", self.event_type)))
    }
}

/// Room events the bridge acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Message(MessageContent),
    Topic { topic: String },
    Member { membership: Membership, state_key: String },
    /// Anything else; ignored.
    Other,
}

/// `m.room.message` content, tagged by `msgtype`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msgtype")]
pub enum MessageContent {
    #[serde(rename = "m.text")]
    Text(TextContent),
    #[serde(rename = "m.emote")]
    Emote(TextContent),
    #[serde(rename = "m.notice")]
    Notice(TextContent),
    #[serde(rename = "m.image")]
    Image(MediaContent),
    #[serde(rename = "m.file")]
    File(MediaContent),
    #[serde(rename = "m.video")]
    Video(MediaContent),
    #[serde(rename = "m.audio")]
    Audio(MediaContent),
    #[serde(other)]
    Unknown,
}

impl MessageContent {
    pub fn msgtype(&self) -> &'static str {
        match self {
            Self::Text(_) => "m.text",
            Self::Emote(_) => "m.emote",
            Self::Notice(_) => "m.notice",
            Self::Image(_) => "m.image",
            Self::File(_) => "m.file",
            Self::Video(_) => "m.video",
            Self::Audio(_) => "m.audio",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextContent {
    pub body: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub formatted_body: Option<String>,
}

impl TextContent {
    /// `formatted_body`, when it is Matrix HTML.
    pub fn html(&self) -> Option<&str> {
        match self.format.as_deref() {
            Some(HTML_FORMAT) => self.formatted_body.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaContent {
    /// Usually the file name.
    pub body: String,
    /// `mxc://` content URI. Absent for encrypted media.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TopicContent {
    topic: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MemberContent {
    membership: Membership,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Leave,
    Ban,
    Knock,
    #[serde(other)]
    Unknown,
}

/// One entry of a room's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub state_key: String,
    #[serde(default)]
    pub content: Value,
}

impl StateEvent {
    /// Membership of `state_key`, for `m.room.member` entries.
    pub fn membership(&self) -> Option<Membership> {
        if self.event_type != ROOM_MEMBER {
            return None;
        }
        Membership::deserialize(self.content.get("membership")?).ok()
    }
}

/// Derive the media download URL for an `mxc://server/media_id` URI.
pub fn mxc_to_http(homeserver_url: &str, mxc: &str) -> Option<String> {
    let (server, media_id) = mxc.strip_prefix("mxc://")?.split_once('/')?;
    if server.is_empty() || media_id.is_empty() {
        return None;
    }
    Some(format!(
        "{}/_matrix/media/v1/download/{server}/{media_id}",
        homeserver_url.trim_end_matches('/')
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_text_message() {
        let event = raw(json!({
            "type": "m.room.message",
            "content": {
                "msgtype": "m.text",
                "body": "I am a fish",
                "format": "org.matrix.custom.html",
                "formatted_body": "I am a <b>fish</b>"
            },
            "user_id": "@flibble:wibble",
            "room_id": "!foo:bar"
        }));
        assert_eq!(event.sender().unwrap(), "@flibble:wibble");
        let RoomEvent::Message(MessageContent::Text(text)) = event.parse().unwrap() else {
            panic!("expected text");
        };
        assert_eq!(text.body, "I am a fish");
        assert_eq!(text.html(), Some("I am a <b>fish</b>"));
    }

    #[test]
    fn test_formatted_body_needs_html_format() {
        let text = TextContent {
            body: "x".into(),
            format: Some("text/markdown".into()),
            formatted_body: Some("**x**".into()),
        };
        assert_eq!(text.html(), None);
    }

    #[test]
    fn test_unknown_msgtype() {
        let event = raw(json!({
            "type": "m.room.message",
            "content": { "msgtype": "m.location", "body": "here", "geo_uri": "geo:0,0" },
            "sender": "@flibble:wibble",
            "room_id": "!foo:bar"
        }));
        assert_eq!(event.parse().unwrap(), RoomEvent::Message(MessageContent::Unknown));
    }

    #[test]
    fn test_missing_body_is_malformed() {
        let event = raw(json!({
            "type": "m.room.message",
            "content": { "msgtype": "m.text" },
            "sender": "@flibble:wibble",
            "room_id": "!foo:bar"
        }));
        assert!(matches!(event.parse(), Err(BridgeError::MalformedEvent(_))));
    }

    #[test]
    fn test_parse_member_and_topic() {
        let invite = raw(json!({
            "type": "m.room.member",
            "content": { "membership": "invite" },
            "state_key": "@irc.example_someone:some.home.server",
            "user_id": "@flibble:wibble",
            "room_id": "!foo:bar"
        }));
        assert_eq!(
            invite.parse().unwrap(),
            RoomEvent::Member {
                membership: Membership::Invite,
                state_key: "@irc.example_someone:some.home.server".into()
            }
        );

        let topic = raw(json!({
            "type": "m.room.topic",
            "content": { "topic": "Topics are amazingz" },
            "user_id": "@flibble:wibble",
            "room_id": "!foo:bar"
        }));
        assert_eq!(
            topic.parse().unwrap(),
            RoomEvent::Topic {
                topic: "Topics are amazingz".into()
            }
        );
    }

    #[test]
    fn test_other_event_types_are_ignored() {
        let event = raw(json!({
            "type": "m.room.redaction",
            "content": {},
            "sender": "@flibble:wibble",
            "room_id": "!foo:bar"
        }));
        assert_eq!(event.parse().unwrap(), RoomEvent::Other);
    }

    #[test]
    fn test_state_membership() {
        let state: StateEvent = serde_json::from_value(json!({
            "type": "m.room.member",
            "state_key": "@flibble:wibble",
            "content": { "membership": "join" },
            "user_id": "@flibble:wibble"
        }))
        .unwrap();
        assert_eq!(state.membership(), Some(Membership::Join));
    }

    #[test]
    fn test_mxc_to_http() {
        assert_eq!(
            mxc_to_http("https://some.home.server.goeshere/", "mxc://some.home.server/ABCDEF").as_deref(),
            Some("https://some.home.server.goeshere/_matrix/media/v1/download/some.home.server/ABCDEF")
        );
        assert_eq!(mxc_to_http("https://hs", "http://not/mxc"), None);
        assert_eq!(mxc_to_http("https://hs", "mxc://server"), None);
    }
}
