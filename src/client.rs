//! Async client for the Crowdplay lobby protocol.
//!
//! [`CrowdplayClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<CrowdplayEvent>`]) returned
//! from [`CrowdplayClient::start`].
//!
//! The background loop owns the transport *and* the [`LobbySession`] reducer:
//! inbound messages are applied strictly in arrival order and intent methods
//! never touch session state — they only queue outbound messages. This is the
//! single-logical-thread model the protocol assumes.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = connect_somehow().await;
//! let store = Arc::new(FileIdentityStore::new("identity.json"));
//! let config = CrowdplayConfig::new("ABCD");
//! let (client, mut events) = CrowdplayClient::start(transport, store, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         CrowdplayEvent::Update(view) => { /* render view.phase */ }
//!         CrowdplayEvent::LobbyInvalid { .. } => break, // navigate away
//!         CrowdplayEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::error::{CrowdplayError, Result};
use crate::event::CrowdplayEvent;
use crate::identity::{IdentityStore, SessionIdentity};
use crate::protocol::{ClientMessage, ParticipantId, ServerMessage};
use crate::session::{LobbySession, Phase, SessionEffect};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default grace delay before the host-ready signal is sent.
const DEFAULT_HOST_READY_GRACE: Duration = Duration::from_secs(2);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`CrowdplayClient`] connection.
///
/// Must be supplied to [`CrowdplayClient::start`]. The only required field is
/// `room_code`; all others have sensible defaults.
///
/// # Example
///
/// ```
/// use crowdplay_client::client::CrowdplayConfig;
///
/// let config = CrowdplayConfig::new("ABCD");
/// assert_eq!(config.room_code, "ABCD");
/// ```
///
/// # Tuning
///
/// ```
/// use crowdplay_client::client::CrowdplayConfig;
/// use std::time::Duration;
///
/// let config = CrowdplayConfig::new("ABCD")
///     .with_event_channel_capacity(512)
///     .with_host_ready_grace(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct CrowdplayConfig {
    /// Short code of the room to join.
    pub room_code: String,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the transport loop.
    /// The `Disconnected` event is always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`CrowdplayClient::shutdown`] is called, the background transport
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    pub shutdown_timeout: Duration,
    /// Grace delay between [`CrowdplayClient::notify_host_ready`] and the
    /// actual `host-game-loaded` message, giving the host's heavier client
    /// time to finish loading assets.
    ///
    /// Defaults to **2 seconds**. This is a deliberate grace period, not a
    /// retry or failure timeout.
    pub host_ready_grace: Duration,
}

impl CrowdplayConfig {
    /// Create a new configuration for the given room code with default values.
    pub fn new(room_code: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            host_ready_grace: DEFAULT_HOST_READY_GRACE,
        }
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the grace delay before the host-ready signal.
    ///
    /// Defaults to **2 seconds**.
    #[must_use]
    pub fn with_host_ready_grace(mut self, grace: Duration) -> Self {
        self.host_ready_grace = grace;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the transport loop.
struct ClientState {
    connected: AtomicBool,
    reconnecting: AtomicBool,
    ended: AtomicBool,
    phase: Mutex<Phase>,
    participant_id: Mutex<Option<ParticipantId>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            reconnecting: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            phase: Mutex::new(Phase::Loading),
            participant_id: Mutex::new(None),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the Crowdplay lobby protocol.
///
/// Created via [`CrowdplayClient::start`], which spawns a background transport
/// loop and returns this handle together with an event receiver.
///
/// All intent methods serialize a [`ClientMessage`] and send it to the
/// transport loop over an unbounded channel. They return immediately once the
/// message is queued (no round-trip await) — the server never replies to an
/// intent directly, it pushes a fresh snapshot instead.
pub struct CrowdplayClient {
    /// Sender half of the command channel to the transport loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the transport loop.
    state: Arc<ClientState>,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
    /// Grace delay before the host-ready signal.
    host_ready_grace: Duration,
    /// The room this client is bound to.
    room_code: String,
}

impl CrowdplayClient {
    /// Start the client transport loop and return a handle plus event receiver.
    ///
    /// The identity store is consulted first to decide **resume** versus
    /// **fresh join**, then the resulting `join-lobby` is queued so the
    /// transport loop sends it as the very first outgoing message. The same
    /// message is replayed automatically on every successful reconnect.
    ///
    /// # Arguments
    ///
    /// * `transport` — A connected [`Transport`] implementation.
    /// * `store` — Durable identity persistence.
    /// * `config` — Client configuration including the room code.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The event receiver yields
    /// [`CrowdplayEvent`]s until the transport closes or the client shuts down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        store: Arc<dyn IdentityStore>,
        config: CrowdplayConfig,
    ) -> (Self, mpsc::Receiver<CrowdplayEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<CrowdplayEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Resume-versus-fresh is decided before anything is sent. A store
        // failure degrades to a fresh join; it must not block the flow.
        let stored = match store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("failed to load stored identity, joining fresh: {e}");
                None
            }
        };
        let identity = SessionIdentity::resume_or_fresh(stored, config.room_code.clone());
        if identity.is_resume() {
            debug!(room_code = %identity.room_code, "resuming previously held seat");
        }
        let session = LobbySession::new(identity);

        let state = Arc::new(ClientState::new());
        let loop_state = Arc::clone(&state);

        // Queue join-lobby through the command channel so the transport loop
        // picks it up as the very first outgoing message.
        // This cannot fail because we just created the channel.
        let _ = cmd_tx.send(session.join_message());

        let task = tokio::spawn(transport_loop(
            transport,
            session,
            store,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            host_ready_grace: config.host_ready_grace,
            room_code: config.room_code,
        };

        (client, event_rx)
    }

    // ── Intent methods ──────────────────────────────────────────────

    /// Claim a display name within the room.
    ///
    /// The name is persisted optimistically for the next visit, but the
    /// rendered phase only advances once the server echoes the name back in
    /// a snapshot. An empty name re-enters name entry through the same path.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::NotConnected`] if the transport has closed,
    /// or [`CrowdplayError::SessionEnded`] after `invalid-lobby`.
    pub fn submit_name(&self, name: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Name { name: name.into() })
    }

    /// Host-only intent to choose the next activity.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::NotConnected`] if the transport has closed,
    /// or [`CrowdplayError::SessionEnded`] after `invalid-lobby`.
    pub fn select_activity(&self, activity_id: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::GameSelect {
            activity_id: activity_id.into(),
        })
    }

    /// Host-only intent to begin the selected activity.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::NotConnected`] if the transport has closed,
    /// or [`CrowdplayError::SessionEnded`] after `invalid-lobby`.
    pub fn start_game(&self) -> Result<()> {
        self.send(ClientMessage::GameStart)
    }

    /// Host-only intent to return the room to lobby phase.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::NotConnected`] if the transport has closed,
    /// or [`CrowdplayError::SessionEnded`] after `invalid-lobby`.
    pub fn exit_game(&self) -> Result<()> {
        self.send(ClientMessage::GameExit)
    }

    /// Signal that the host's client has finished loading the activity.
    ///
    /// The actual `host-game-loaded` message is sent after the configured
    /// grace delay (default 2 s), giving slower assets time to settle. The
    /// server arbitrates host-ness; non-host calls are ignored there.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::NotConnected`] if the transport has closed,
    /// or [`CrowdplayError::SessionEnded`] after `invalid-lobby`.
    pub fn notify_host_ready(&self) -> Result<()> {
        if self.state.ended.load(Ordering::Acquire) {
            return Err(CrowdplayError::SessionEnded);
        }
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(CrowdplayError::NotConnected);
        }

        let cmd_tx = self.cmd_tx.clone();
        let grace = self.host_ready_grace;
        debug!(?grace, "host-ready signal scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // The loop may have exited during the grace period; that is fine.
            let _ = cmd_tx.send(ClientMessage::HostGameLoaded);
        });
        Ok(())
    }

    /// Shut down the client, closing the transport and stopping the background task.
    ///
    /// Rendered state resets to `Loading`. After calling this method, the
    /// event receiver will yield `None` once the transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("CrowdplayClient: shutdown requested");

        // Signal the transport loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the transport loop with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        // Reset rendered state to its initial `Loading`; a snapshot in flight
        // can no longer mutate anything because the loop (the only writer)
        // is gone.
        self.state.connected.store(false, Ordering::Release);
        self.state.reconnecting.store(false, Ordering::Release);
        *self.state.phase.lock().await = Phase::Loading;
        *self.state.participant_id.lock().await = None;
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport loop is believed to be running.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` while the connection is down and the last view is
    /// displayed stale.
    pub fn is_reconnecting(&self) -> bool {
        self.state.reconnecting.load(Ordering::Acquire)
    }

    /// Returns `true` once the room was reported invalid; every further
    /// intent fails with [`CrowdplayError::SessionEnded`].
    pub fn is_session_ended(&self) -> bool {
        self.state.ended.load(Ordering::Acquire)
    }

    /// The room code this client was started for.
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// The currently rendered phase.
    pub async fn phase(&self) -> Phase {
        *self.state.phase.lock().await
    }

    /// The server-confirmed participant id, if a snapshot has assigned one.
    pub async fn participant_id(&self) -> Option<ParticipantId> {
        *self.state.participant_id.lock().await
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a `ClientMessage` to the transport loop.
    fn send(&self, msg: ClientMessage) -> Result<()> {
        if self.state.ended.load(Ordering::Acquire) {
            return Err(CrowdplayError::SessionEnded);
        }
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(CrowdplayError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| CrowdplayError::NotConnected)
    }
}

impl std::fmt::Debug for CrowdplayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdplayClient")
            .field("room_code", &self.room_code)
            .field("connected", &self.is_connected())
            .field("reconnecting", &self.is_reconnecting())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for CrowdplayClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the transport loop future to be dropped immediately.  The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background transport loop that multiplexes send/receive via `tokio::select!`.
///
/// Owns the [`LobbySession`] reducer: every inbound message is applied in
/// arrival order and the returned effects are executed here — nothing else
/// ever writes session state.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
async fn transport_loop(
    mut transport: impl Transport,
    mut session: LobbySession,
    store: Arc<dyn IdentityStore>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<CrowdplayEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    // Emit the synthetic Connected event before entering the select loop.
    emit_event(&event_tx, CrowdplayEvent::Connected).await;

    loop {
        tokio::select! {
            // Branch 1: outgoing intent from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        // Nothing leaves for a room the server declared gone.
                        // Covers messages queued before invalid-lobby arrived,
                        // like a delayed host-ready signal.
                        if session.is_ended() {
                            debug!(
                                "dropping outbound message after invalid-lobby: {:?}",
                                std::mem::discriminant(&msg)
                            );
                            continue;
                        }
                        if let ClientMessage::Name { name } = &msg {
                            // Optimistic persistence at submission time — a
                            // UX convenience for the next visit, never a gate
                            // on any transition.
                            let identity = session.note_submitted_name(name);
                            persist_identity(&store, &identity);
                        }
                        if let Err(e) = send_message(&mut transport, &msg).await {
                            error!("transport send error: {e}");
                            emit_disconnected(
                                &event_tx,
                                &state,
                                Some(format!("transport send error: {e}")),
                            ).await;
                            break;
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => {
                                let effects = session.apply(server_msg);
                                if let Err(e) = apply_effects(
                                    &mut transport,
                                    &session,
                                    &store,
                                    &event_tx,
                                    &state,
                                    effects,
                                ).await {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &state,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                // A corrupt snapshot cannot be partially
                                // applied; surface it loudly and drop it.
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Serialize and transmit one outbound message.
///
/// Serialization errors are programming bugs; they are logged and skipped
/// rather than killing the loop. Transport errors are fatal for the loop.
async fn send_message(transport: &mut impl Transport, msg: &ClientMessage) -> Result<()> {
    debug!("sending client message: {:?}", std::mem::discriminant(msg));
    match serde_json::to_string(msg) {
        Ok(json) => transport.send(json).await,
        Err(e) => {
            error!("failed to serialize ClientMessage: {e}");
            Ok(())
        }
    }
}

/// Execute the effects returned by [`LobbySession::apply`].
///
/// Returns an error only for fatal transport send failures; everything else
/// is handled in place.
async fn apply_effects(
    transport: &mut impl Transport,
    session: &LobbySession,
    store: &Arc<dyn IdentityStore>,
    event_tx: &mpsc::Sender<CrowdplayEvent>,
    state: &ClientState,
    effects: Vec<SessionEffect>,
) -> Result<()> {
    for effect in effects {
        match effect {
            SessionEffect::PersistIdentity(identity) => {
                persist_identity(store, &identity);
            }
            SessionEffect::ReplayJoin => {
                debug!("replaying join-lobby with persisted identity");
                send_message(transport, &session.join_message()).await?;
            }
            SessionEffect::Redial => match transport.reconnect().await {
                Ok(()) => {
                    debug!("redial after server-initiated disconnect succeeded");
                    send_message(transport, &session.join_message()).await?;
                }
                Err(e) => {
                    // The next recv will surface the dead transport.
                    error!("redial after server-initiated disconnect failed: {e}");
                }
            },
            SessionEffect::EmitUpdate => {
                state.reconnecting.store(false, Ordering::Release);
                *state.phase.lock().await = session.phase();
                *state.participant_id.lock().await = session.identity().participant_id;
                emit_event(event_tx, CrowdplayEvent::Update(Box::new(session.view()))).await;
            }
            SessionEffect::EmitNameRejected => {
                emit_event(event_tx, CrowdplayEvent::NameRejected).await;
            }
            SessionEffect::EmitLobbyInvalid => {
                state.ended.store(true, Ordering::Release);
                emit_event(
                    event_tx,
                    CrowdplayEvent::LobbyInvalid {
                        room_code: session.identity().room_code.clone(),
                    },
                )
                .await;
            }
            SessionEffect::EmitReconnecting(reason) => {
                state.reconnecting.store(true, Ordering::Release);
                emit_event(event_tx, CrowdplayEvent::Reconnecting { reason }).await;
            }
        }
    }
    Ok(())
}

/// Best-effort identity persistence: a failed write is logged, never fatal.
fn persist_identity(store: &Arc<dyn IdentityStore>, identity: &SessionIdentity) {
    if let Err(e) = store.save(identity) {
        warn!("failed to persist session identity: {e}");
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the transport loop.
async fn emit_event(event_tx: &mpsc::Sender<CrowdplayEvent>, event: CrowdplayEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](CrowdplayEvent::Disconnected) event and update state.
///
/// Uses `send().await` (blocking) instead of `try_send` because `Disconnected`
/// is always the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<CrowdplayEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    state.reconnecting.store(false, Ordering::Release);
    let event = CrowdplayEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityStore;
    use crate::protocol::{
        DisconnectReason, LobbySnapshot, Participant, SelfInfo, SnapshotPhase,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, CrowdplayError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
        /// How many times `reconnect()` was called.
        redials: Arc<AtomicUsize>,
    }

    impl MockTransport {
        #[allow(clippy::type_complexity)]
        fn new(
            incoming: Vec<Option<std::result::Result<String, CrowdplayError>>>,
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
        async fn send(&mut self, message: String) -> std::result::Result<(), CrowdplayError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, CrowdplayError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages have been delivered — hang forever
                // so the transport loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn reconnect(&mut self) -> std::result::Result<(), CrowdplayError> {
            self.redials.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn close(&mut self) -> std::result::Result<(), CrowdplayError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn named_snapshot() -> LobbySnapshot {
        LobbySnapshot {
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
        }
    }

    fn update_json(snapshot: LobbySnapshot) -> String {
        serde_json::to_string(&ServerMessage::Update(Box::new(snapshot))).unwrap()
    }

    fn disconnect_json(reason: DisconnectReason) -> String {
        serde_json::to_string(&ServerMessage::Disconnect { reason }).unwrap()
    }

    fn reconnect_json() -> String {
        serde_json::to_string(&ServerMessage::Reconnect).unwrap()
    }

    fn sent_join_count(sent: &Arc<StdMutex<Vec<String>>>) -> usize {
        sent.lock()
            .unwrap()
            .iter()
            .filter_map(|raw| serde_json::from_str::<ClientMessage>(raw).ok())
            .filter(|msg| matches!(msg, ClientMessage::JoinLobby { .. }))
            .count()
    }

    fn empty_store() -> Arc<dyn IdentityStore> {
        Arc::new(MemoryIdentityStore::new())
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_join_lobby_first() {
        let (transport, sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        // First event should be Connected.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, CrowdplayEvent::Connected));

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert!(!messages.is_empty());
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            assert_eq!(
                first,
                ClientMessage::JoinLobby {
                    room_code: "ABCD".into(),
                    participant_id: None,
                    name: None,
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn resume_join_carries_stored_identity() {
        let store = Arc::new(MemoryIdentityStore::seeded(SessionIdentity {
            room_code: "ABCD".into(),
            participant_id: Some(7),
            display_name: Some("Ana".into()),
        }));
        let (transport, sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, store, config);

        let _ = events.recv().await; // Connected
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            assert_eq!(
                first,
                ClientMessage::JoinLobby {
                    room_code: "ABCD".into(),
                    participant_id: Some(7),
                    name: Some("Ana".into()),
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn stored_identity_for_other_room_joins_fresh() {
        let store = Arc::new(MemoryIdentityStore::seeded(SessionIdentity {
            room_code: "ABCD".into(),
            participant_id: Some(7),
            display_name: Some("Ana".into()),
        }));
        let (transport, sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("WXYZ");
        let (mut client, mut events) = CrowdplayClient::start(transport, store, config);

        let _ = events.recv().await; // Connected
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            // No seat carried over, but the saved name is still offered.
            assert_eq!(
                first,
                ClientMessage::JoinLobby {
                    room_code: "WXYZ".into(),
                    participant_id: None,
                    name: Some("Ana".into()),
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn update_emits_view_and_sets_phase() {
        let (transport, _sent, _closed, _redials) =
            MockTransport::new(vec![Some(Ok(update_json(named_snapshot())))]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        let CrowdplayEvent::Update(view) = event else {
            panic!("expected Update, got {event:?}");
        };
        assert_eq!(view.phase, Phase::Lobby);
        assert_eq!(view.me.id, Some(7));

        assert_eq!(client.phase().await, Phase::Lobby);
        assert_eq!(client.participant_id().await, Some(7));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn confirmed_identity_is_persisted() {
        let store = Arc::new(MemoryIdentityStore::new());
        let dyn_store: Arc<dyn IdentityStore> = Arc::clone(&store) as Arc<dyn IdentityStore>;
        let (transport, _sent, _closed, _redials) =
            MockTransport::new(vec![Some(Ok(update_json(named_snapshot())))]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, dyn_store, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Update

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.room_code, "ABCD");
        assert_eq!(saved.participant_id, Some(7));
        assert_eq!(saved.display_name.as_deref(), Some("Ana"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_name_persists_optimistically() {
        let store = Arc::new(MemoryIdentityStore::new());
        let dyn_store: Arc<dyn IdentityStore> = Arc::clone(&store) as Arc<dyn IdentityStore>;
        let (transport, sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("WXYZ");
        let (mut client, mut events) = CrowdplayClient::start(transport, dyn_store, config);

        let _ = events.recv().await; // Connected
        client.submit_name("Ana").unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Persisted before any server confirmation (UX convenience only).
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.display_name.as_deref(), Some("Ana"));
        assert_eq!(saved.participant_id, None);

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(
                last,
                ClientMessage::Name {
                    name: "Ana".into()
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_name_emits_rejection_without_identity_write() {
        let store = Arc::new(MemoryIdentityStore::new());
        let dyn_store: Arc<dyn IdentityStore> = Arc::clone(&store) as Arc<dyn IdentityStore>;
        let invalid_name = serde_json::to_string(&ServerMessage::InvalidName).unwrap();
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![Some(Ok(invalid_name))]);

        let config = CrowdplayConfig::new("WXYZ");
        let (mut client, mut events) = CrowdplayClient::start(transport, dyn_store, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, CrowdplayEvent::NameRejected));

        // The rejection itself writes nothing.
        assert!(store.load().unwrap().is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_lobby_ends_session_and_blocks_sends() {
        let invalid_lobby = serde_json::to_string(&ServerMessage::InvalidLobby).unwrap();
        let (transport, sent, _closed, _redials) = MockTransport::new(vec![Some(Ok(invalid_lobby))]);

        let config = CrowdplayConfig::new("GONE");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, CrowdplayEvent::LobbyInvalid { ref room_code } if room_code == "GONE")
        );
        assert!(client.is_session_ended());

        let sent_before = sent.lock().unwrap().len();
        let result = client.submit_name("Ana");
        assert!(matches!(result, Err(CrowdplayError::SessionEnded)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sent.lock().unwrap().len(), sent_before);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_replays_join_once() {
        let (transport, sent, _closed, redials) = MockTransport::new(vec![
            Some(Ok(update_json(named_snapshot()))),
            Some(Ok(disconnect_json(DisconnectReason::TransportDrop))),
            Some(Ok(reconnect_json())),
        ]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Update
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            CrowdplayEvent::Reconnecting {
                reason: DisconnectReason::TransportDrop
            }
        ));
        assert!(client.is_reconnecting());

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Initial join + exactly one replay, carrying the confirmed seat.
        assert_eq!(sent_join_count(&sent), 2);
        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(
                last,
                ClientMessage::JoinLobby {
                    participant_id: Some(7),
                    ..
                }
            ));
        }
        // Network-level drop: the transport retries on its own, no redial.
        assert_eq!(redials.load(Ordering::Relaxed), 0);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconnecting_clears_only_after_next_update() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![
            Some(Ok(disconnect_json(DisconnectReason::TransportDrop))),
            Some(Ok(reconnect_json())),
            Some(Ok(update_json(named_snapshot()))),
        ]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Reconnecting
        assert!(client.is_reconnecting());

        let event = events.recv().await.unwrap(); // Update
        assert!(matches!(event, CrowdplayEvent::Update(_)));
        assert!(!client.is_reconnecting());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_initiated_disconnect_redials_immediately() {
        let (transport, sent, _closed, redials) = MockTransport::new(vec![Some(Ok(
            disconnect_json(DisconnectReason::ServerInitiated),
        ))]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            CrowdplayEvent::Reconnecting {
                reason: DisconnectReason::ServerInitiated
            }
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(redials.load(Ordering::Relaxed), 1);
        // The redial is followed by a join replay over the new connection.
        assert_eq!(sent_join_count(&sent), 2);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_resets_rendered_state_to_loading() {
        let (transport, _sent, closed, _redials) =
            MockTransport::new(vec![Some(Ok(update_json(named_snapshot())))]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Update
        assert_eq!(client.phase().await, Phase::Lobby);

        client.shutdown().await;

        assert_eq!(client.phase().await, Phase::Loading);
        assert_eq!(client.participant_id().await, None);
        assert!(!client.is_connected());
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let result = client.start_game();
        assert!(matches!(result, Err(CrowdplayError::NotConnected)));
    }

    #[tokio::test]
    async fn host_ready_is_sent_after_grace_delay() {
        let (transport, sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD").with_host_ready_grace(Duration::from_millis(30));
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        client.notify_host_ready().unwrap();

        // Not yet: still inside the grace window.
        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let messages = sent.lock().unwrap();
            assert!(!messages
                .iter()
                .filter_map(|raw| serde_json::from_str::<ClientMessage>(raw).ok())
                .any(|msg| matches!(msg, ClientMessage::HostGameLoaded)));
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(last, ClientMessage::HostGameLoaded);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = CrowdplayConfig::new("ABCD");
        assert_eq!(config.room_code, "ABCD");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.host_ready_grace, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn config_builder_methods() {
        let config = CrowdplayConfig::new("ABCD")
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_host_ready_grace(Duration::from_millis(250));
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.host_ready_grace, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = CrowdplayConfig::new("ABCD").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![
            Some(Ok(update_json(named_snapshot()))),
            // Explicit None signals clean transport close.
            None,
        ]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Update
        let event = events.recv().await.unwrap(); // Disconnected
        assert!(matches!(event, CrowdplayEvent::Disconnected { .. }));

        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_recv_error_emits_disconnected() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![Some(Err(
            CrowdplayError::TransportReceive("boom".into()),
        ))]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, CrowdplayEvent::Disconnected { .. }));
        if let CrowdplayEvent::Disconnected { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_server_message_is_dropped_not_fatal() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![
            Some(Ok("{\"type\":\"mystery\"}".into())),
            Some(Ok(update_json(named_snapshot()))),
        ]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected
        // The malformed message is logged and skipped; the next one applies.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, CrowdplayEvent::Update(_)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected

        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected

        // Drop the client without calling shutdown.
        drop(client);

        // The transport loop should eventually exit; the event channel
        // will close. We just verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        // More snapshots than the event channel can hold.
        let mut incoming: Vec<Option<std::result::Result<String, CrowdplayError>>> = Vec::new();
        for _ in 0..20 {
            incoming.push(Some(Ok(update_json(named_snapshot()))));
        }
        incoming.push(None);

        let (transport, _sent, _closed, _redials) = MockTransport::new(incoming);

        let config = CrowdplayConfig::new("ABCD").with_event_channel_capacity(1);
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        // Don't read events immediately — let the channel fill up.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // At minimum Connected (first try_send) and the final Disconnected
        // (blocking send); intermediate updates may be dropped.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(
            count < 22,
            "expected backpressure to drop some events, but got all {count}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("CrowdplayClient"));
        assert!(debug_str.contains("ABCD"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (transport, _sent, closed, _redials) = MockTransport::new(vec![]);

        let config = CrowdplayConfig::new("ABCD");
        let (mut client, mut events) = CrowdplayClient::start(transport, empty_store(), config);

        let _ = events.recv().await; // Connected

        client.shutdown().await;

        // After shutdown, a Disconnected event should have been emitted.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, CrowdplayEvent::Disconnected { .. }));
        if let CrowdplayEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }

        // The transport should have been closed.
        assert!(closed.load(Ordering::Relaxed));
    }
}
