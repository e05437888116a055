//! # Basic Lobby Example
//!
//! Demonstrates a complete Crowdplay client lifecycle:
//!
//! 1. Connect to a lobby server via WebSocket
//! 2. Join a room with the identity saved from a previous run (resume)
//! 3. Enter a name when the server asks for one
//! 4. React to snapshots as the room fills up and an activity starts
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a Crowdplay lobby server on localhost:3434, then:
//! cargo run --example basic_lobby
//!
//! # Override the server URL or the room code:
//! CROWDPLAY_URL=ws://my-server:3434/lobby CROWDPLAY_ROOM=WXYZ cargo run --example basic_lobby
//! ```

use std::sync::Arc;

use crowdplay_client::{
    CrowdplayClient, CrowdplayConfig, CrowdplayEvent, FileIdentityStore, Phase, WebSocketTransport,
};

/// Default server URL when `CROWDPLAY_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:3434/lobby";

/// Default room code when `CROWDPLAY_ROOM` is not set.
const DEFAULT_ROOM: &str = "ABCD";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("CROWDPLAY_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let room_code = std::env::var("CROWDPLAY_ROOM").unwrap_or_else(|_| DEFAULT_ROOM.to_string());
    tracing::info!("Connecting to {url}, room {room_code}");

    // The identity file is what lets a rerun resume the same seat.
    let store = Arc::new(FileIdentityStore::new(
        std::env::temp_dir().join("crowdplay-identity.json"),
    ));

    // ── Connect ─────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&url).await?;

    // Start the client. This spawns a background task that drives the
    // transport, sends `join-lobby` first, and emits events on `event_rx`.
    let (mut client, mut event_rx) =
        CrowdplayClient::start(transport, store, CrowdplayConfig::new(room_code));

    // ── Event loop ──────────────────────────────────────────────────
    // Use `tokio::select!` to listen for both server events and Ctrl+C.
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the client.
            event = event_rx.recv() => {
                let Some(event) = event else {
                    // Channel closed — transport loop exited.
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    // ── Synthetic: transport connected ───────────────
                    CrowdplayEvent::Connected => {
                        tracing::info!("Transport connected, join-lobby queued…");
                    }

                    // ── Snapshot applied ─────────────────────────────
                    CrowdplayEvent::Update(view) => match view.phase {
                        Phase::Loading => {
                            tracing::info!("Waiting for the room to settle…");
                        }
                        Phase::AwaitingName => {
                            // A real app would show a name-entry form here.
                            tracing::info!("No name yet — claiming one");
                            client.submit_name("RustPlayer")?;
                        }
                        Phase::Lobby => {
                            let roster: Vec<&str> = view
                                .participant_list
                                .iter()
                                .map(|p| p.name.as_str())
                                .collect();
                            tracing::info!(
                                "In the lobby with {} participant(s): {roster:?}",
                                view.participant_list.len()
                            );
                            if view.me.is_host && !view.selected_activity_id.is_empty() {
                                tracing::info!(
                                    "Host view — starting {}",
                                    view.selected_activity_id
                                );
                                client.start_game()?;
                            }
                        }
                        Phase::InGame => {
                            tracing::info!("Activity {} running", view.selected_activity_id);
                            if view.me.is_host {
                                // Sent after the configured grace delay.
                                client.notify_host_ready()?;
                            }
                        }
                    },

                    // ── Failure signals ──────────────────────────────
                    CrowdplayEvent::NameRejected => {
                        tracing::error!("Name already in use — pick another");
                    }

                    CrowdplayEvent::LobbyInvalid { room_code } => {
                        // Terminal: a real app would navigate back to /join.
                        tracing::error!("Room {room_code} does not exist or expired");
                        break;
                    }

                    // ── Connectivity ─────────────────────────────────
                    CrowdplayEvent::Reconnecting { reason } => {
                        tracing::warn!("Connection lost ({reason:?}), reconnecting…");
                    }

                    CrowdplayEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }
                }
            }

            // Branch 2: Ctrl+C — shut down gracefully.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
