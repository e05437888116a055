//! # Crowdplay Client
//!
//! Transport-agnostic Rust client for the Crowdplay party-game lobby protocol.
//!
//! This crate provides a high-level async client that keeps an identity-bound
//! session synchronized with a lobby server using JSON text messages over any
//! bidirectional transport. The server is the single source of truth: it
//! pushes total-replacement snapshots, and the client renders exactly one of
//! a small set of mutually-exclusive phases from the latest one.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any backend
//! - **Resume-aware** — a persisted [`SessionIdentity`] returns the client to
//!   the same seat after a reload or reconnect
//! - **Snapshot-driven** — one authoritative `update` message; no client-side
//!   conflict resolution, no local optimism
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketTransport`
//! - **Event-driven** — receive typed `CrowdplayEvent`s via a channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crowdplay_client::{
//!     CrowdplayClient, CrowdplayConfig, CrowdplayEvent, FileIdentityStore, WebSocketTransport,
//! };
//!
//! let transport = WebSocketTransport::connect("ws://localhost:3434/lobby").await?;
//! let store = Arc::new(FileIdentityStore::new("identity.json"));
//! let (client, mut events) = CrowdplayClient::start(transport, store, CrowdplayConfig::new("ABCD"));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         CrowdplayEvent::Update(view) => { /* render view.phase */ }
//!         CrowdplayEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod catalog;
#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod error;
pub mod event;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use catalog::ActivityCatalog;
#[cfg(feature = "tokio-runtime")]
pub use client::{CrowdplayClient, CrowdplayConfig};
pub use error::CrowdplayError;
pub use event::CrowdplayEvent;
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore, SessionIdentity};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{LobbySession, LobbyView, Phase};
pub use transport::Transport;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
