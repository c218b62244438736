//! Process-wide session registry.
//!
//! Maps live session ids to their turn trackers for introspection. The relay
//! never reads from the registry; it only registers on session start and
//! releases on teardown through [`SessionRegistration`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use thiserror::Error;

use crate::core::latency::{TurnSnapshot, TurnTracker};

/// Tracker handle shared between a session's relay and the registry.
pub type SharedTracker = Arc<Mutex<TurnTracker>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Session already registered: {0}")]
    DuplicateSession(String),
}

static LAST_SESSION_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Generate a `session_<millis>` id.
///
/// Ids are strictly increasing within the process: a second request in the
/// same millisecond is assigned the next millisecond value.
pub fn generate_session_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut last = LAST_SESSION_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_SESSION_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return format!("session_{candidate}"),
            Err(actual) => last = actual,
        }
    }
}

/// Live sessions keyed by id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SharedTracker>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tracker under its session id.
    ///
    /// The entry lives until the returned registration is released or dropped.
    pub fn register(&self, tracker: SharedTracker) -> Result<SessionRegistration, RegistryError> {
        let session_id = tracker.lock().session_id().to_string();

        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateSession(session_id)),
            Entry::Vacant(slot) => {
                slot.insert(tracker);
                tracing::debug!(session_id = %session_id, "Session registered");
                Ok(SessionRegistration {
                    registry: self.clone(),
                    session_id,
                    released: false,
                })
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SharedTracker> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshots of all live sessions, ordered by session id.
    pub fn snapshots(&self) -> Vec<TurnSnapshot> {
        // Clone handles first so no map shard is held while locking trackers
        let trackers: Vec<SharedTracker> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut snapshots: Vec<TurnSnapshot> =
            trackers.iter().map(|tracker| tracker.lock().snapshot()).collect();
        snapshots.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        snapshots
    }

    fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id = %session_id, "Session deregistered");
        }
        removed
    }
}

/// Scoped registry entry. Dropping it removes the session.
pub struct SessionRegistration {
    registry: SessionRegistry,
    session_id: String,
    released: bool,
}

impl SessionRegistration {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Remove the session now. Returns whether an entry was removed.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.registry.remove(&self.session_id)
    }
}

impl Drop for SessionRegistration {
    fn drop(&mut self) {
        if !self.released {
            self.registry.remove(&self.session_id);
        }
    }
}
