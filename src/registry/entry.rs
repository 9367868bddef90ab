//! Session entry and statistics types
//!
//! This module defines the per-session state stored in the registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use super::queue::{Pushed, QueueSender};

/// Entry for a single active session in the registry
pub(super) struct SessionEntry<T> {
    /// Registry-assigned session id, distinguishes successive sessions of one id
    pub session_id: u64,

    /// Sending end of the session's outbound queue
    pub tx: QueueSender<T>,

    /// Frames accepted into the queue
    pub enqueued: AtomicU64,

    /// Frames dropped to make room for newer ones
    pub dropped: AtomicU64,

    /// When the session was activated
    pub created_at: Instant,
}

impl<T> SessionEntry<T> {
    pub(super) fn new(session_id: u64, tx: QueueSender<T>) -> Self {
        Self {
            session_id,
            tx,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Push a frame and account for it
    pub(super) fn push(&self, frame: T) -> Result<Pushed, T> {
        let pushed = self.tx.push(frame)?;
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        if pushed == Pushed::DroppedOldest {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(pushed)
    }

    pub(super) fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id,
            queued: self.tx.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            age: self.created_at.elapsed(),
        }
    }
}

/// Statistics for an active session
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Registry-assigned session id
    pub session_id: u64,
    /// Frames currently waiting in the outbound queue
    pub queued: usize,
    /// Frames accepted since activation
    pub enqueued: u64,
    /// Frames dropped because the queue was full
    pub dropped: u64,
    /// Time since activation
    pub age: Duration,
}
