//! Durable session identity and its persistence seam.
//!
//! [`SessionIdentity`] is the record that lets a refreshed or reconnected
//! client return to the same seat: the last room code, the server-allocated
//! participant id, and the last entered display name. [`IdentityStore`]
//! abstracts where that record lives so the client stays platform-agnostic —
//! a JSON file on native ([`FileIdentityStore`]), an in-process slot for
//! tests and demos ([`MemoryIdentityStore`]).
//!
//! Retention is unlimited: identities are only ever overwritten by a newer
//! join, never deleted, so the trait deliberately has no `clear`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::ParticipantId;

// ── SessionIdentity ─────────────────────────────────────────────────

/// The identity a client carries across page reloads and reconnects.
///
/// Owned by the client; the server only ever sees it inside `join-lobby`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    /// Short code of the room this identity belongs to.
    pub room_code: String,
    /// Server-allocated participant id; present only once a snapshot has
    /// confirmed the seat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<ParticipantId>,
    /// Last entered display name. Persisted optimistically at submission
    /// time — a pure UX convenience for the next visit, never a gate on any
    /// state transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SessionIdentity {
    /// A brand-new identity for `room_code` with no seat and no name.
    pub fn fresh(room_code: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            participant_id: None,
            display_name: None,
        }
    }

    /// Decide between **resume** and **fresh join** for `room_code`.
    ///
    /// The stored participant id is forwarded only when the stored room code
    /// matches the requested one, so the server can re-attach the same
    /// participant record (host status, score, etc.). The saved display name
    /// is forwarded either way.
    pub fn resume_or_fresh(stored: Option<SessionIdentity>, room_code: impl Into<String>) -> Self {
        let room_code = room_code.into();
        match stored {
            Some(prev) => {
                let participant_id = if prev.room_code == room_code {
                    prev.participant_id
                } else {
                    None
                };
                Self {
                    room_code,
                    participant_id,
                    display_name: prev.display_name,
                }
            }
            None => Self::fresh(room_code),
        }
    }

    /// Returns `true` if this identity carries a server-confirmed seat.
    pub fn is_resume(&self) -> bool {
        self.participant_id.is_some()
    }
}

// ── IdentityStore ───────────────────────────────────────────────────

/// Durable, unscoped persistence for the session identity.
///
/// Implementations must be callable from the background transport loop, so
/// the trait requires `Send + Sync`. Failures are surfaced as errors but
/// callers treat persistence as best-effort: a failed write is logged and
/// must never block a state transition.
pub trait IdentityStore: Send + Sync {
    /// Load the previously saved identity, if any.
    fn load(&self) -> Result<Option<SessionIdentity>>;

    /// Overwrite the saved identity.
    fn save(&self, identity: &SessionIdentity) -> Result<()>;
}

// ── FileIdentityStore ───────────────────────────────────────────────

/// An [`IdentityStore`] backed by a single JSON file.
///
/// The file is created on first save (including missing parent directories)
/// and has no expiry — it lives for the life of the device profile.
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Create a store persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<SessionIdentity>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, identity: &SessionIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(identity)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

// ── MemoryIdentityStore ─────────────────────────────────────────────

/// An in-memory [`IdentityStore`] for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<SessionIdentity>>,
}

impl MemoryIdentityStore {
    /// An empty store (no saved identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with `identity`, as if a previous visit saved it.
    pub fn seeded(identity: SessionIdentity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<SessionIdentity>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save(&self, identity: &SessionIdentity) -> Result<()> {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(identity.clone());
        Ok(())
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

    fn stored_identity() -> SessionIdentity {
        SessionIdentity {
            room_code: "ABCD".into(),
            participant_id: Some(7),
            display_name: Some("Ana".into()),
        }
    }

    #[test]
    fn resume_when_room_code_matches() {
        let identity = SessionIdentity::resume_or_fresh(Some(stored_identity()), "ABCD");
        assert_eq!(identity.participant_id, Some(7));
        assert_eq!(identity.display_name.as_deref(), Some("Ana"));
        assert!(identity.is_resume());
    }

    #[test]
    fn fresh_when_room_code_differs_but_name_survives() {
        let identity = SessionIdentity::resume_or_fresh(Some(stored_identity()), "WXYZ");
        assert_eq!(identity.room_code, "WXYZ");
        assert_eq!(identity.participant_id, None);
        // The saved name is still offered to the new room.
        assert_eq!(identity.display_name.as_deref(), Some("Ana"));
        assert!(!identity.is_resume());
    }

    #[test]
    fn fresh_when_nothing_stored() {
        let identity = SessionIdentity::resume_or_fresh(None, "WXYZ");
        assert_eq!(identity, SessionIdentity::fresh("WXYZ"));
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("identity.json"));

        assert!(store.load().unwrap().is_none());

        store.save(&stored_identity()).unwrap();
        assert_eq!(store.load().unwrap(), Some(stored_identity()));

        // Overwrite, never append.
        let updated = SessionIdentity {
            participant_id: Some(8),
            ..stored_identity()
        };
        store.save(&updated).unwrap();
        assert_eq!(store.load().unwrap(), Some(updated));
    }

    #[test]
    fn file_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("nested/profile/identity.json"));
        store.save(&stored_identity()).unwrap();
        assert_eq!(store.load().unwrap(), Some(stored_identity()));
    }

    #[test]
    fn file_store_rejects_corrupt_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileIdentityStore::new(path);
        assert!(store.load().is_err());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryIdentityStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&stored_identity()).unwrap();
        assert_eq!(store.load().unwrap(), Some(stored_identity()));
    }

    #[test]
    fn seeded_memory_store_loads_seed() {
        let store = MemoryIdentityStore::seeded(stored_identity());
        assert_eq!(store.load().unwrap(), Some(stored_identity()));
    }
}
