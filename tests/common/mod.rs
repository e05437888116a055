#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Crowdplay client integration tests.
//!
//! Provides a scripted [`MockTransport`] and helper functions for
//! constructing common server message JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use crowdplay_client::protocol::{
    DisconnectReason, LobbySnapshot, Participant, SelfInfo, ServerMessage, SnapshotPhase,
};
use crowdplay_client::{ClientMessage, CrowdplayError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-free mock transport for integration testing.
///
/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    /// Scripted server responses (consumed in order by `recv`).
    incoming: VecDeque<Option<Result<String, CrowdplayError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
    /// How many times `reconnect()` has been called.
    pub redials: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming messages.
    ///
    /// Returns the transport plus shared handles for inspecting sent
    /// messages, whether close was called, and how often the client redialed.
    #[allow(clippy::type_complexity)]
    pub fn new(
        incoming: Vec<Option<Result<String, CrowdplayError>>>,
    ) -> (
        Self,
        Arc<StdMutex<Vec<String>>>,
        Arc<AtomicBool>,
        Arc<AtomicUsize>,
    ) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let redials = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            redials: Arc::clone(&redials),
        };
        (transport, sent, closed, redials)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), CrowdplayError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CrowdplayError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages — hang forever so the transport loop
            // stays alive until shutdown is called.
            std::future::pending().await
        }
    }

    async fn reconnect(&mut self) -> Result<(), CrowdplayError> {
        self.redials.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CrowdplayError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Snapshot builders ───────────────────────────────────────────────

/// A lobby-phase snapshot whose `self` has a confirmed seat and name.
pub fn named_snapshot(id: u32, name: &str, is_host: bool) -> LobbySnapshot {
    LobbySnapshot {
        phase: SnapshotPhase::Lobby,
        participant_list: vec![Participant {
            id,
            name: name.into(),
            is_host,
        }],
        me: SelfInfo {
            id: Some(id),
            name: Some(name.into()),
            is_host,
        },
        selected_activity_id: String::new(),
        activity_state: serde_json::Value::Null,
    }
}

/// A lobby-phase snapshot whose `self` has a seat but no acknowledged name.
pub fn unnamed_snapshot(id: u32) -> LobbySnapshot {
    LobbySnapshot {
        phase: SnapshotPhase::Lobby,
        participant_list: vec![],
        me: SelfInfo {
            id: Some(id),
            name: None,
            is_host: false,
        },
        selected_activity_id: String::new(),
        activity_state: serde_json::Value::Null,
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON string for an `update` server message.
pub fn update_json(snapshot: LobbySnapshot) -> String {
    serde_json::to_string(&ServerMessage::Update(Box::new(snapshot)))
        .expect("update_json serialization")
}

/// Returns the JSON string for an `invalid-name` server message.
pub fn invalid_name_json() -> String {
    serde_json::to_string(&ServerMessage::InvalidName).expect("invalid_name_json serialization")
}

/// Returns the JSON string for an `invalid-lobby` server message.
pub fn invalid_lobby_json() -> String {
    serde_json::to_string(&ServerMessage::InvalidLobby).expect("invalid_lobby_json serialization")
}

/// Returns the JSON string for a `disconnect` server message.
pub fn disconnect_json(reason: DisconnectReason) -> String {
    serde_json::to_string(&ServerMessage::Disconnect { reason })
        .expect("disconnect_json serialization")
}

/// Returns the JSON string for a `reconnect` server message.
pub fn reconnect_json() -> String {
    serde_json::to_string(&ServerMessage::Reconnect).expect("reconnect_json serialization")
}

// ── Sent-message inspection ─────────────────────────────────────────

/// Decode every recorded outgoing message.
pub fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|raw| serde_json::from_str(raw).expect("sent message decodes"))
        .collect()
}

/// Count the `join-lobby` messages among the recorded outgoing messages.
pub fn join_count(sent: &Arc<StdMutex<Vec<String>>>) -> usize {
    sent_messages(sent)
        .into_iter()
        .filter(|msg| matches!(msg, ClientMessage::JoinLobby { .. }))
        .count()
}
