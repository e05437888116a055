#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Crowdplay lobby protocol.
//!
//! Pins the exact JSON each message produces — kebab-case `type` tags,
//! camelCase payload fields, the snapshot's `self` field — and the
//! deserialization behavior for minimal and malformed server payloads.

use crowdplay_client::protocol::{
    ClientMessage, DisconnectReason, LobbySnapshot, Participant, SelfInfo, ServerMessage,
    SnapshotPhase,
};

// ════════════════════════════════════════════════════════════════════
// Client → server fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_lobby_resume_wire_format() {
    let msg = ClientMessage::JoinLobby {
        room_code: "ABCD".into(),
        participant_id: Some(7),
        name: Some("Ana".into()),
    };
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"join-lobby","data":{"roomCode":"ABCD","participantId":7,"name":"Ana"}}"#
    );
}

#[test]
fn join_lobby_fresh_omits_absent_identity() {
    let msg = ClientMessage::JoinLobby {
        room_code: "WXYZ".into(),
        participant_id: None,
        name: None,
    };
    // A fresh join carries no participantId and no name keys at all.
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"join-lobby","data":{"roomCode":"WXYZ"}}"#
    );
}

#[test]
fn name_wire_format() {
    let msg = ClientMessage::Name { name: "Ana".into() };
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"name","data":{"name":"Ana"}}"#
    );
}

#[test]
fn game_select_wire_format() {
    let msg = ClientMessage::GameSelect {
        activity_id: "trivia".into(),
    };
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"game-select","data":{"activityId":"trivia"}}"#
    );
}

#[test]
fn bare_intents_have_no_data_payload() {
    assert_eq!(
        serde_json::to_string(&ClientMessage::GameStart).unwrap(),
        r#"{"type":"game-start"}"#
    );
    assert_eq!(
        serde_json::to_string(&ClientMessage::GameExit).unwrap(),
        r#"{"type":"game-exit"}"#
    );
    assert_eq!(
        serde_json::to_string(&ClientMessage::HostGameLoaded).unwrap(),
        r#"{"type":"host-game-loaded"}"#
    );
}

// ════════════════════════════════════════════════════════════════════
// Server → client fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn update_wire_format() {
    let snapshot = LobbySnapshot {
        phase: SnapshotPhase::Lobby,
        participant_list: vec![Participant {
            id: 7,
            name: "Ana".into(),
            is_host: true,
        }],
        me: SelfInfo {
            id: Some(7),
            name: Some("Ana".into()),
            is_host: true,
        },
        selected_activity_id: String::new(),
        activity_state: serde_json::Value::Null,
    };
    let msg = ServerMessage::Update(Box::new(snapshot));
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        concat!(
            r#"{"type":"update","data":{"phase":"lobby","#,
            r#""participantList":[{"id":7,"name":"Ana","isHost":true}],"#,
            r#""self":{"id":7,"name":"Ana","isHost":true},"#,
            r#""selectedActivityId":"","activityState":null}}"#
        )
    );
}

#[test]
fn update_parses_a_real_server_payload() {
    let raw = r#"{
        "type": "update",
        "data": {
            "phase": "in-game",
            "participantList": [
                {"id": 7, "name": "Ana", "isHost": false},
                {"id": 8, "name": "Bo", "isHost": true}
            ],
            "self": {"id": 7, "name": "Ana", "isHost": false},
            "selectedActivityId": "trivia",
            "activityState": {"round": 3, "scores": {"Ana": 10}}
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(raw).unwrap();
    let ServerMessage::Update(snapshot) = msg else {
        panic!("expected update");
    };
    assert_eq!(snapshot.phase, SnapshotPhase::InGame);
    assert_eq!(snapshot.participant_list.len(), 2);
    assert_eq!(snapshot.host().map(|p| p.id), Some(8));
    assert_eq!(snapshot.me.id, Some(7));
    assert_eq!(snapshot.selected_activity_id, "trivia");
    assert_eq!(snapshot.activity_state["round"], 3);
}

#[test]
fn update_parses_minimal_payload_with_defaults() {
    // Pre-name snapshot: no selection, no activity state, anonymous self.
    let raw = r#"{"type":"update","data":{"phase":"lobby","participantList":[],"self":{}}}"#;
    let msg: ServerMessage = serde_json::from_str(raw).unwrap();
    let ServerMessage::Update(snapshot) = msg else {
        panic!("expected update");
    };
    assert_eq!(snapshot.me, SelfInfo::default());
    assert_eq!(snapshot.selected_activity_id, "");
    assert_eq!(snapshot.activity_state, serde_json::Value::Null);
    assert!(snapshot.host().is_none());
}

#[test]
fn anonymous_self_omits_absent_fields() {
    let me = SelfInfo {
        id: Some(7),
        name: None,
        is_host: false,
    };
    assert_eq!(
        serde_json::to_string(&me).unwrap(),
        r#"{"id":7,"isHost":false}"#
    );
}

#[test]
fn phase_spelling_on_the_wire() {
    assert_eq!(
        serde_json::to_string(&SnapshotPhase::Loading).unwrap(),
        r#""loading""#
    );
    assert_eq!(
        serde_json::to_string(&SnapshotPhase::Lobby).unwrap(),
        r#""lobby""#
    );
    assert_eq!(
        serde_json::to_string(&SnapshotPhase::InGame).unwrap(),
        r#""in-game""#
    );
}

#[test]
fn failure_signals_wire_format() {
    assert_eq!(
        serde_json::to_string(&ServerMessage::InvalidName).unwrap(),
        r#"{"type":"invalid-name"}"#
    );
    assert_eq!(
        serde_json::to_string(&ServerMessage::InvalidLobby).unwrap(),
        r#"{"type":"invalid-lobby"}"#
    );
}

#[test]
fn disconnect_reason_is_a_tag_not_a_string_match() {
    assert_eq!(
        serde_json::to_string(&ServerMessage::Disconnect {
            reason: DisconnectReason::ServerInitiated
        })
        .unwrap(),
        r#"{"type":"disconnect","data":{"reason":"server-initiated"}}"#
    );
    assert_eq!(
        serde_json::to_string(&ServerMessage::Disconnect {
            reason: DisconnectReason::TransportDrop
        })
        .unwrap(),
        r#"{"type":"disconnect","data":{"reason":"transport-drop"}}"#
    );

    let msg: ServerMessage =
        serde_json::from_str(r#"{"type":"disconnect","data":{"reason":"server-initiated"}}"#)
            .unwrap();
    let ServerMessage::Disconnect { reason } = msg else {
        panic!("expected disconnect");
    };
    assert!(reason.is_server_initiated());
}

#[test]
fn reconnect_wire_format() {
    assert_eq!(
        serde_json::to_string(&ServerMessage::Reconnect).unwrap(),
        r#"{"type":"reconnect"}"#
    );
}

// ════════════════════════════════════════════════════════════════════
// Malformed payloads
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_message_type_is_rejected() {
    let result = serde_json::from_str::<ServerMessage>(r#"{"type":"mystery"}"#);
    assert!(result.is_err());
}

#[test]
fn unknown_phase_is_rejected() {
    // A corrupt snapshot must fail as a whole — there is no partial apply.
    let raw = r#"{"type":"update","data":{"phase":"paused","participantList":[],"self":{}}}"#;
    assert!(serde_json::from_str::<ServerMessage>(raw).is_err());
}

#[test]
fn truncated_payload_is_rejected() {
    let raw = r#"{"type":"update","data":{"phase":"lobby""#;
    assert!(serde_json::from_str::<ServerMessage>(raw).is_err());
}
