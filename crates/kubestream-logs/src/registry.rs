use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry entry for one live session
struct SessionEntry {
    cancel: CancellationToken,
    generation: u64,
    started_at: DateTime<Utc>,
}

/// Thread-safe table of active log sessions keyed by connection id
///
/// The lock only ever guards map operations; cancelling a token never blocks.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    /// Session id -> entry
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,

    /// Next generation number
    next_generation: Arc<AtomicU64>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, cancelling and evicting any previous one with the same id
    ///
    /// Returns the generation that the session must present to [`remove`](Self::remove).
    pub fn register(&self, id: &str, cancel: CancellationToken) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock();

        if let Some(previous) = sessions.remove(id) {
            previous.cancel.cancel();
            debug!(
                connection_id = id,
                age_ms = (Utc::now() - previous.started_at).num_milliseconds(),
                "replaced existing log session"
            );
        }

        sessions.insert(
            id.to_string(),
            SessionEntry {
                cancel,
                generation,
                started_at: Utc::now(),
            },
        );

        generation
    }

    /// Cancel and remove a session. Returns false if no session was registered.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.sessions.lock().remove(id);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a session without cancelling it, if it is still the given generation
    pub fn remove(&self, id: &str, generation: u64) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(id) {
            Some(entry) if entry.generation == generation => {
                sessions.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Cancel and remove every session, returning how many there were
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<SessionEntry> =
            self.sessions.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.cancel.cancel();
        }
        drained.len()
    }

    /// Whether a session with this id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Check if no sessions are active
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
