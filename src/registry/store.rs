//! Session registry implementation
//!
//! The registry that tracks active sessions of one kind and owns the sending
//! end of each session's outbound queue.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::message::{DownlinkFrame, HandlerId, RouterId, UplinkDelivery};

use super::config::RegistryConfig;
use super::entry::{SessionEntry, SessionStats};
use super::error::RegistryError;
use super::queue::{self, OutboundQueue, Pushed};

/// Outcome of a successful enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The frame was queued
    Queued,
    /// The queue was full; the oldest pending frame was dropped to make room
    Backpressure,
}

/// Registry of active router sessions and their downlink queues
pub type RouterRegistry = SessionRegistry<RouterId, DownlinkFrame>;

/// Registry of active handler sessions and their uplink queues
pub type HandlerRegistry = SessionRegistry<HandlerId, UplinkDelivery>;

/// Registry of active sessions keyed by `K`, each with an outbound queue of `T`
///
/// Lock sections are short map operations; nothing awaits while holding the
/// lock, so a synchronous `RwLock` is used.
pub struct SessionRegistry<K, T> {
    /// Map of session id to session entry
    sessions: RwLock<HashMap<K, SessionEntry<T>>>,

    /// Session kind used in log output ("router", "handler")
    kind: &'static str,

    next_session_id: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

impl<K, T> SessionRegistry<K, T>
where
    K: Clone + Eq + Hash + Display,
{
    /// Create a new registry with default configuration
    pub fn new(kind: &'static str) -> Self {
        Self::with_config(kind, RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(kind: &'static str, config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            kind,
            next_session_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Activate a session
    ///
    /// Returns the receiving end of the session's outbound queue. Fails with
    /// `AlreadyActive` if a session with this id exists; the existing session
    /// is left untouched.
    pub fn activate(&self, id: &K) -> Result<OutboundQueue<T>, RegistryError> {
        let mut sessions = self.sessions.write();

        if sessions.contains_key(id) {
            tracing::warn!(kind = self.kind, id = %id, "Activation rejected: already active");
            return Err(RegistryError::AlreadyActive(id.to_string()));
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = queue::channel(self.config.queue_capacity, session_id);
        sessions.insert(id.clone(), SessionEntry::new(session_id, tx));

        tracing::info!(
            kind = self.kind,
            id = %id,
            session_id = session_id,
            active = sessions.len(),
            "Session activated"
        );

        Ok(rx)
    }

    /// Deactivate a session regardless of which activation created it
    ///
    /// Closes the outbound queue. Returns false if no session was active.
    pub fn deactivate(&self, id: &K) -> bool {
        let removed = self.sessions.write().remove(id);

        match removed {
            Some(entry) => {
                self.close_entry(id, entry);
                true
            }
            None => false,
        }
    }

    /// Deactivate a session only if it is still the given activation
    ///
    /// A stale teardown from an earlier session must not remove a successor
    /// that activated the same id in the meantime.
    pub fn deactivate_session(&self, id: &K, session_id: u64) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(id) {
                Some(entry) if entry.session_id == session_id => sessions.remove(id),
                Some(entry) => {
                    tracing::warn!(
                        kind = self.kind,
                        id = %id,
                        expected = entry.session_id,
                        actual = session_id,
                        "Session deactivate mismatch"
                    );
                    None
                }
                None => None,
            }
        };

        match removed {
            Some(entry) => {
                self.close_entry(id, entry);
                true
            }
            None => false,
        }
    }

    /// Enqueue a frame to a session's outbound queue
    ///
    /// A full queue is not an error: the oldest pending frame is dropped and
    /// `EnqueueOutcome::Backpressure` is returned.
    pub fn enqueue(&self, id: &K, frame: T) -> Result<EnqueueOutcome, RegistryError> {
        let sessions = self.sessions.read();

        let entry = sessions
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        match entry.push(frame) {
            Ok(Pushed::Queued) => Ok(EnqueueOutcome::Queued),
            Ok(Pushed::DroppedOldest) => {
                tracing::warn!(
                    kind = self.kind,
                    id = %id,
                    capacity = self.config.queue_capacity,
                    "Outbound queue full, dropped oldest frame"
                );
                Ok(EnqueueOutcome::Backpressure)
            }
            // Closed but not yet removed: deactivation is in progress
            Err(_) => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    /// Look up an active session
    pub fn lookup(&self, id: &K) -> Option<SessionStats> {
        self.sessions.read().get(id).map(SessionEntry::stats)
    }

    /// The session id of the active session for `id`, if one is found
    pub fn current_session(&self, id: &K) -> Option<u64> {
        self.sessions.read().get(id).map(|entry| entry.session_id)
    }

    /// Whether `session_id` is still the active session for `id`
    pub fn is_current(&self, id: &K, session_id: u64) -> bool {
        self.current_session(id) == Some(session_id)
    }

    /// Check if a session is active
    pub fn is_active(&self, id: &K) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Ids of all active sessions
    pub fn active_ids(&self) -> Vec<K> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no sessions are active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn close_entry(&self, id: &K, entry: SessionEntry<T>) {
        entry.tx.close();
        let stats = entry.stats();

        tracing::info!(
            kind = self.kind,
            id = %id,
            session_id = stats.session_id,
            enqueued = stats.enqueued,
            dropped = stats.dropped,
            lifetime_ms = stats.age.as_millis() as u64,
            "Session deactivated"
        );
    }
}

/// Deactivates a session when dropped
///
/// Ties registry membership to the lifetime of the transport that owns the
/// session, so cancellation always closes the queue.
pub struct SessionGuard<K, T>
where
    K: Clone + Eq + Hash + Display,
{
    registry: Arc<SessionRegistry<K, T>>,
    id: K,
    session_id: u64,
}

impl<K, T> SessionGuard<K, T>
where
    K: Clone + Eq + Hash + Display,
{
    pub fn new(registry: Arc<SessionRegistry<K, T>>, id: K, session_id: u64) -> Self {
        Self {
            registry,
            id,
            session_id,
        }
    }

    pub fn id(&self) -> &K {
        &self.id
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

impl<K, T> Drop for SessionGuard<K, T>
where
    K: Clone + Eq + Hash + Display,
{
    fn drop(&mut self) {
        self.registry.deactivate_session(&self.id, self.session_id);
    }
}
