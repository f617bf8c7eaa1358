//! Integration tests for the invite, alias-query and user-query flows.

mod common;

use common::matrix::NEW_ROOM_ID;
use common::{
    BOT_NICK, Expose, HS_DOMAIN, Harness, MatrixCall, ROOM_ID, SERVER, USER_ID, event, message,
    virtual_user,
};
use matrix_irc_bridge::{BridgeError, FlowStep};
use serde_json::json;

fn invite(state_key: &str) -> matrix_irc_bridge::matrix::RawEvent {
    event(json!({
        "content": { "membership": "invite" },
        "state_key": state_key,
        "user_id": USER_ID,
        "room_id": ROOM_ID,
        "type": "m.room.member",
    }))
}

// ============================================================================
// Invite flow
// ============================================================================

#[tokio::test]
async fn test_invite_runs_steps_in_order() {
    let h = Harness::new();
    h.irc.set_online("someone");
    h.matrix.seed_member(ROOM_ID, USER_ID);

    h.bridge.handle(&invite(&virtual_user("someone"))).await.unwrap();

    let whois = h.journal.position("irc a_nick whois someone").unwrap();
    let register = h.journal.position("matrix register irc.example_someone").unwrap();
    let join = h.journal.position("matrix join_room !foo:bar").unwrap();
    let state = h.journal.position("matrix room_state !foo:bar").unwrap();
    assert!(whois < register && register < join && join < state);

    assert_eq!(
        h.matrix.calls(),
        vec![
            MatrixCall::Register {
                login_type: "m.login.application_service".into(),
                user: "irc.example_someone".into(),
            },
            MatrixCall::JoinRoom {
                room_id: ROOM_ID.into(),
                as_user: Some(virtual_user("someone")),
            },
            MatrixCall::RoomState { room_id: ROOM_ID.into() },
        ]
    );
    assert!(h.bridge.rooms.is_registered(&virtual_user("someone")));
}

#[tokio::test]
async fn test_invited_room_becomes_pm_room() {
    let h = Harness::new();
    h.irc.set_online("someone");
    h.matrix.seed_member(ROOM_ID, USER_ID);
    h.bridge.handle(&invite(&virtual_user("someone"))).await.unwrap();

    let pm = h.bridge.rooms.pm_room(ROOM_ID).unwrap();
    assert_eq!(pm.server_id, SERVER);
    assert_eq!(pm.nick, "someone");
    assert_eq!(pm.matrix_user, USER_ID);

    h.bridge
        .handle(&message(json!({ "body": "hi there", "msgtype": "m.text" })))
        .await
        .unwrap();
    let says = h.irc.calls_of("say");
    assert_eq!(says.len(), 1);
    assert_eq!(says[0].nick, "flibble");
    assert_eq!(says[0].args, vec!["someone", "hi there"]);
    assert!(h.irc.calls_of("join").is_empty());
}

#[tokio::test]
async fn test_invite_for_offline_nick_stops_at_whois() {
    let h = Harness::new();
    let err = h
        .bridge
        .handle(&invite(&virtual_user("nobody")))
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(FlowStep::Whois));
    assert!(h.matrix.calls().is_empty());
    assert!(h.bridge.rooms.pm_room(ROOM_ID).is_none());
}

#[tokio::test]
async fn test_invite_tolerates_existing_user() {
    let h = Harness::new();
    h.irc.set_online("someone");
    h.matrix.seed_member(ROOM_ID, USER_ID);
    h.matrix.take_user("irc.example_someone");

    h.bridge.handle(&invite(&virtual_user("someone"))).await.unwrap();
    assert!(h.bridge.rooms.pm_room(ROOM_ID).is_some());
}

#[tokio::test]
async fn test_second_invite_skips_registration() {
    let h = Harness::new();
    h.irc.set_online("someone");
    h.matrix.seed_member(ROOM_ID, USER_ID);
    h.matrix.seed_member("!other:bar", USER_ID);

    h.bridge.handle(&invite(&virtual_user("someone"))).await.unwrap();
    h.bridge
        .invite_flow("!other:bar", USER_ID, &virtual_user("someone"))
        .await
        .unwrap();

    let registers = h
        .matrix
        .calls()
        .into_iter()
        .filter(|c| matches!(c, MatrixCall::Register { .. }))
        .count();
    assert_eq!(registers, 1);
}

#[tokio::test]
async fn test_invite_fails_reconcile_when_inviter_left() {
    let h = Harness::new();
    h.irc.set_online("someone");

    let err = h
        .bridge
        .handle(&invite(&virtual_user("someone")))
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(FlowStep::Reconcile));
    assert!(h.bridge.rooms.pm_room(ROOM_ID).is_none());
}

#[tokio::test]
async fn test_invite_needs_private_messages_exposed() {
    let h = Harness::with_expose(Expose {
        channels: true,
        private_messages: false,
    });
    h.irc.set_online("someone");

    let err = h
        .bridge
        .handle(&invite(&virtual_user("someone")))
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(FlowStep::Resolve));
    assert!(h.irc.calls().is_empty());
}

#[tokio::test]
async fn test_invite_for_real_user_is_ignored() {
    let h = Harness::new();
    h.bridge.handle(&invite("@bob:wibble")).await.unwrap();
    assert!(h.irc.calls().is_empty());
    assert!(h.matrix.calls().is_empty());
}

// ============================================================================
// Alias queries
// ============================================================================

fn alias(channel: &str) -> String {
    format!("#{SERVER}_{channel}:{HS_DOMAIN}")
}

#[tokio::test]
async fn test_alias_query_creates_room_and_joins_channel() {
    let h = Harness::new();
    let room_id = h.bridge.alias_query(&alias("#foobar")).await.unwrap();
    assert_eq!(room_id, NEW_ROOM_ID);

    assert_eq!(
        h.matrix.calls(),
        vec![MatrixCall::CreateRoom {
            room_alias_name: "irc.example_#foobar".into(),
        }]
    );
    let joins = h.irc.calls_of("join");
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].nick, BOT_NICK);
    assert_eq!(joins[0].args, vec!["#foobar"]);

    let channels = h.bridge.rooms.channels_for_room(NEW_ROOM_ID);
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].channel, "#foobar");
}

#[tokio::test]
async fn test_alias_room_bridges_messages() {
    let h = Harness::new();
    h.bridge.alias_query(&alias("#foobar")).await.unwrap();

    h.bridge
        .handle(&event(json!({
            "content": { "body": "hello foobar", "msgtype": "m.text" },
            "user_id": USER_ID,
            "room_id": NEW_ROOM_ID,
            "type": "m.room.message",
        })))
        .await
        .unwrap();
    let says = h.irc.calls_of("say");
    assert_eq!(says[0].args, vec!["#foobar", "hello foobar"]);
}

#[tokio::test]
async fn test_alias_query_fails_when_room_creation_fails() {
    let h = Harness::new();
    h.matrix.take_alias("irc.example_#foobar");

    let err = h.bridge.alias_query(&alias("#foobar")).await.unwrap_err();
    assert_eq!(err.step(), Some(FlowStep::CreateRoom));
    assert_eq!(err.errcode(), Some("M_ROOM_IN_USE"));
    assert!(h.bridge.rooms.rooms_for_channel(SERVER, "#foobar").is_empty());
}

#[tokio::test]
async fn test_alias_query_fails_when_join_fails() {
    let h = Harness::new();
    h.irc.refuse_channel("#foobar");

    let err = h.bridge.alias_query(&alias("#foobar")).await.unwrap_err();
    assert_eq!(err.step(), Some(FlowStep::JoinChannel));
    assert!(h.bridge.rooms.channels_for_room(NEW_ROOM_ID).is_empty());
}

#[tokio::test]
async fn test_alias_query_rejects_unknown_alias() {
    let h = Harness::new();
    for bad in [
        "#irc.example_foobar:some.home.server",
        "#irc.other_#foobar:some.home.server",
        "#irc.example_#foobar:elsewhere",
    ] {
        let err = h.bridge.alias_query(bad).await.unwrap_err();
        assert_eq!(err.step(), Some(FlowStep::Resolve), "{bad}");
    }
    assert!(h.matrix.calls().is_empty());
}

#[tokio::test]
async fn test_alias_query_rejects_malformed_channel() {
    let h = Harness::new();
    for bad in [
        "#irc.example_#foo bar\r\nQUIT:some.home.server",
        "#irc.example_#foo bar:some.home.server",
        "#irc.example_#foo\nQUIT:some.home.server",
        "#irc.example_#a,#b:some.home.server",
    ] {
        let err = h.bridge.alias_query(bad).await.unwrap_err();
        assert_eq!(err.step(), Some(FlowStep::Resolve), "{bad:?}");
        let BridgeError::FlowStepFailed { source, .. } = &err else {
            panic!("unexpected error for {bad:?}: {err}");
        };
        assert!(matches!(**source, BridgeError::UnrecognizedIdentity(_)), "{bad:?}: {err}");
    }
    assert!(h.matrix.calls().is_empty());
    assert!(h.irc.calls().is_empty());
}

#[tokio::test]
async fn test_alias_query_needs_channels_exposed() {
    let h = Harness::with_expose(Expose {
        channels: false,
        private_messages: true,
    });
    let err = h.bridge.alias_query(&alias("#foobar")).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::FlowStepFailed { ref source, .. } if matches!(**source, BridgeError::NotExposed(_))
    ));
}

// ============================================================================
// User queries
// ============================================================================

#[tokio::test]
async fn test_user_query_registers_online_nick() {
    let h = Harness::new();
    h.irc.set_online("someone");
    h.bridge.user_query(&virtual_user("someone")).await.unwrap();
    assert_eq!(
        h.matrix.calls(),
        vec![MatrixCall::Register {
            login_type: "m.login.application_service".into(),
            user: "irc.example_someone".into(),
        }]
    );
}

#[tokio::test]
async fn test_user_query_for_offline_nick() {
    let h = Harness::new();
    let err = h.bridge.user_query(&virtual_user("nobody")).await.unwrap_err();
    assert_eq!(err.step(), Some(FlowStep::Whois));
    assert!(h.matrix.calls().is_empty());
}
