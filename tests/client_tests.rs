//! Integration-style client tests for the Crowdplay client.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! responses and verify that `CrowdplayClient` processes them correctly:
//! resume and fresh joins, snapshot application, reconnection replay, the
//! failure signals, and teardown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use crowdplay_client::protocol::DisconnectReason;
use crowdplay_client::{
    ClientMessage, CrowdplayClient, CrowdplayConfig, CrowdplayError, CrowdplayEvent,
    IdentityStore, MemoryIdentityStore, Phase, SessionIdentity,
};

use common::{
    disconnect_json, invalid_lobby_json, invalid_name_json, join_count, named_snapshot,
    reconnect_json, sent_messages, unnamed_snapshot, update_json, MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Start a client for `room_code` with the given store and scripted server
/// responses.
#[allow(clippy::type_complexity)]
fn start_client(
    room_code: &str,
    store: Arc<dyn IdentityStore>,
    incoming: Vec<Option<Result<String, CrowdplayError>>>,
) -> (
    CrowdplayClient,
    tokio::sync::mpsc::Receiver<CrowdplayEvent>,
    std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    std::sync::Arc<std::sync::atomic::AtomicBool>,
    std::sync::Arc<std::sync::atomic::AtomicUsize>,
) {
    let (transport, sent, closed, redials) = MockTransport::new(incoming);
    let config = CrowdplayConfig::new(room_code);
    let (client, events) = CrowdplayClient::start(transport, store, config);
    (client, events, sent, closed, redials)
}

/// Consume the synthetic `Connected` event that always comes first.
async fn drain_connected(rx: &mut tokio::sync::mpsc::Receiver<CrowdplayEvent>) {
    let ev = rx.recv().await.expect("expected Connected event");
    assert!(
        matches!(ev, CrowdplayEvent::Connected),
        "first event should be Connected, got {ev:?}"
    );
}

fn seeded_store(room_code: &str, participant_id: u32, name: &str) -> Arc<dyn IdentityStore> {
    Arc::new(MemoryIdentityStore::seeded(SessionIdentity {
        room_code: room_code.into(),
        participant_id: Some(participant_id),
        display_name: Some(name.into()),
    }))
}

fn empty_store() -> Arc<dyn IdentityStore> {
    Arc::new(MemoryIdentityStore::new())
}

// ════════════════════════════════════════════════════════════════════
// Resume versus fresh join
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn resume_scenario_rejoins_the_same_seat() {
    // Stored {ABCD, 7, Ana} matches the requested room "ABCD".
    let (mut client, mut events, sent, _closed, _redials) = start_client(
        "ABCD",
        seeded_store("ABCD", 7, "Ana"),
        vec![Some(Ok(update_json(named_snapshot(7, "Ana", false))))],
    );

    drain_connected(&mut events).await;

    let ev = events.recv().await.expect("event");
    let CrowdplayEvent::Update(view) = ev else {
        panic!("expected Update, got {ev:?}");
    };
    // Name present → straight into the lobby, same seat as before.
    assert_eq!(view.phase, Phase::Lobby);
    assert_eq!(view.me.id, Some(7));
    assert!(!view.me.is_host);

    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let messages = sent_messages(&sent);
        assert_eq!(
            messages.first(),
            Some(&ClientMessage::JoinLobby {
                room_code: "ABCD".into(),
                participant_id: Some(7),
                name: Some("Ana".into()),
            })
        );
    }

    client.shutdown().await;
}

#[tokio::test]
async fn fresh_scenario_awaits_name() {
    // No stored identity for room "WXYZ".
    let (mut client, mut events, sent, _closed, _redials) = start_client(
        "WXYZ",
        empty_store(),
        vec![Some(Ok(update_json(unnamed_snapshot(3))))],
    );

    drain_connected(&mut events).await;

    let ev = events.recv().await.expect("event");
    let CrowdplayEvent::Update(view) = ev else {
        panic!("expected Update, got {ev:?}");
    };
    assert_eq!(view.phase, Phase::AwaitingName);
    assert!(view.me.name.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let messages = sent_messages(&sent);
        assert_eq!(
            messages.first(),
            Some(&ClientMessage::JoinLobby {
                room_code: "WXYZ".into(),
                participant_id: None,
                name: None,
            })
        );
    }

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Snapshot application
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn each_update_fully_replaces_the_view() {
    let mut second = named_snapshot(7, "Ana", true);
    second.selected_activity_id = "trivia".into();
    second.activity_state = serde_json::json!({"round": 2});

    let (mut client, mut events, _sent, _closed, _redials) = start_client(
        "ABCD",
        empty_store(),
        vec![
            Some(Ok(update_json(named_snapshot(7, "Ana", false)))),
            Some(Ok(update_json(second))),
        ],
    );

    drain_connected(&mut events).await;

    let _ = events.recv().await; // first Update
    let ev = events.recv().await.expect("event");
    let CrowdplayEvent::Update(view) = ev else {
        panic!("expected Update, got {ev:?}");
    };

    // Nothing survives from the first snapshot.
    assert_eq!(view.selected_activity_id, "trivia");
    assert_eq!(view.activity_state, serde_json::json!({"round": 2}));
    assert!(view.me.is_host);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Name collision
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn taken_name_is_rejected_without_seat_persistence() {
    let store = Arc::new(MemoryIdentityStore::new());
    let (mut client, mut events, _sent, _closed, _redials) = start_client(
        "WXYZ",
        Arc::clone(&store) as Arc<dyn IdentityStore>,
        vec![
            Some(Ok(update_json(unnamed_snapshot(3)))),
            Some(Ok(invalid_name_json())),
        ],
    );

    drain_connected(&mut events).await;
    let _ = events.recv().await; // Update (awaiting name)

    client.submit_name("Ana").expect("submit name");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Seat allocation and the optimistic name write are both allowed…
    let before = store.load().expect("load").expect("identity");
    assert_eq!(before.participant_id, Some(3));
    assert_eq!(before.display_name.as_deref(), Some("Ana"));

    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, CrowdplayEvent::NameRejected));

    // …but the rejection itself mutates nothing, and the phase stays put.
    assert_eq!(client.phase().await, Phase::AwaitingName);
    let after = store.load().expect("load").expect("identity");
    assert_eq!(after, before);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Disconnect / reconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reconnect_replays_exactly_one_join_with_the_stored_seat() {
    let (mut client, mut events, sent, _closed, redials) = start_client(
        "ABCD",
        seeded_store("ABCD", 7, "Ana"),
        vec![
            Some(Ok(update_json(named_snapshot(7, "Ana", false)))),
            Some(Ok(disconnect_json(DisconnectReason::TransportDrop))),
            Some(Ok(reconnect_json())),
            Some(Ok(update_json(named_snapshot(7, "Ana", false)))),
        ],
    );

    drain_connected(&mut events).await;
    let _ = events.recv().await; // Update

    let ev = events.recv().await.expect("event");
    assert!(matches!(
        ev,
        CrowdplayEvent::Reconnecting {
            reason: DisconnectReason::TransportDrop
        }
    ));
    assert!(client.is_reconnecting());

    // The indicator clears only once the post-reconnect snapshot arrives.
    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, CrowdplayEvent::Update(_)));
    assert!(!client.is_reconnecting());

    // Exactly one replay (plus the initial join), same participant id.
    assert_eq!(join_count(&sent), 2);
    let messages = sent_messages(&sent);
    let replay = messages
        .iter()
        .filter(|m| matches!(m, ClientMessage::JoinLobby { .. }))
        .next_back()
        .expect("replayed join");
    assert_eq!(
        replay,
        &ClientMessage::JoinLobby {
            room_code: "ABCD".into(),
            participant_id: Some(7),
            name: Some("Ana".into()),
        }
    );
    // Network drop: the transport retries by itself, no client-driven redial.
    assert_eq!(redials.load(std::sync::atomic::Ordering::Relaxed), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn server_initiated_disconnect_redials_and_rejoins() {
    let (mut client, mut events, sent, _closed, redials) = start_client(
        "ABCD",
        seeded_store("ABCD", 7, "Ana"),
        vec![Some(Ok(disconnect_json(DisconnectReason::ServerInitiated)))],
    );

    drain_connected(&mut events).await;

    let ev = events.recv().await.expect("event");
    assert!(matches!(
        ev,
        CrowdplayEvent::Reconnecting {
            reason: DisconnectReason::ServerInitiated
        }
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(redials.load(std::sync::atomic::Ordering::Relaxed), 1);
    assert_eq!(join_count(&sent), 2);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Invalid lobby
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn invalid_lobby_leaves_the_flow_for_good() {
    let (mut client, mut events, sent, _closed, _redials) =
        start_client("GONE", empty_store(), vec![Some(Ok(invalid_lobby_json()))]);

    drain_connected(&mut events).await;

    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, CrowdplayEvent::LobbyInvalid { ref room_code } if room_code == "GONE"));
    assert!(client.is_session_ended());

    // No further protocol messages for this room.
    let sent_before = sent.lock().expect("lock").len();
    assert!(matches!(
        client.submit_name("Ana"),
        Err(CrowdplayError::SessionEnded)
    ));
    assert!(matches!(
        client.select_activity("trivia"),
        Err(CrowdplayError::SessionEnded)
    ));
    assert!(matches!(
        client.start_game(),
        Err(CrowdplayError::SessionEnded)
    ));
    assert!(matches!(
        client.notify_host_ready(),
        Err(CrowdplayError::SessionEnded)
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sent.lock().expect("lock").len(), sent_before);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Host intents
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_intents_serialize_in_order() {
    let (mut client, mut events, sent, _closed, _redials) = start_client(
        "ABCD",
        empty_store(),
        vec![Some(Ok(update_json(named_snapshot(7, "Ana", true))))],
    );

    drain_connected(&mut events).await;
    let _ = events.recv().await; // Update

    client.select_activity("trivia").expect("select");
    client.start_game().expect("start");
    client.exit_game().expect("exit");

    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = sent_messages(&sent);
    let tail: Vec<&ClientMessage> = messages.iter().skip(messages.len() - 3).collect();
    assert_eq!(
        tail,
        vec![
            &ClientMessage::GameSelect {
                activity_id: "trivia".into()
            },
            &ClientMessage::GameStart,
            &ClientMessage::GameExit,
        ]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn host_ready_waits_out_the_grace_delay() {
    let (transport, sent, _closed, _redials) = MockTransport::new(vec![Some(Ok(update_json(
        named_snapshot(7, "Ana", true),
    )))]);
    let config = CrowdplayConfig::new("ABCD").with_host_ready_grace(Duration::from_millis(40));
    let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

    drain_connected(&mut events).await;
    let _ = events.recv().await; // Update

    client.notify_host_ready().expect("notify");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!sent_messages(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::HostGameLoaded)));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(sent_messages(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::HostGameLoaded)));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shutdown_closes_transport_and_resets_to_loading() {
    // A snapshot is scripted but the consumer never reads it — teardown must
    // still leave the client in its initial state.
    let (mut client, mut events, _sent, closed, _redials) = start_client(
        "ABCD",
        empty_store(),
        vec![Some(Ok(update_json(named_snapshot(7, "Ana", false))))],
    );

    drain_connected(&mut events).await;

    client.shutdown().await;

    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));
    assert!(!client.is_connected());
    assert_eq!(client.phase().await, Phase::Loading);
    assert_eq!(client.participant_id().await, None);
}
