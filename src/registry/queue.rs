//! Bounded outbound queue with drop-oldest overflow
//!
//! Each session owns exactly one receiving end. The registry keeps the
//! sending end and closes it on deactivation; a receiver waiting on a closed
//! queue returns `None` immediately and frames still pending are discarded.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct State<T> {
    frames: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// Result of pushing a frame into an open queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    /// The frame was queued without displacing anything
    Queued,
    /// The queue was full and its oldest frame was dropped
    DroppedOldest,
}

/// Sending end of an outbound queue, held by the registry
pub(crate) struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

/// Receiving end of a session's outbound queue
pub struct OutboundQueue<T> {
    shared: Arc<Shared<T>>,
    session_id: u64,
}

/// Create a connected sender/receiver pair
pub(crate) fn channel<T>(capacity: usize, session_id: u64) -> (QueueSender<T>, OutboundQueue<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            frames: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            closed: false,
        }),
        notify: Notify::new(),
    });

    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        OutboundQueue { shared, session_id },
    )
}

impl<T> QueueSender<T> {
    /// Push a frame, dropping the oldest pending one if the queue is full
    ///
    /// Returns the frame back if the queue has been closed.
    pub(crate) fn push(&self, frame: T) -> Result<Pushed, T> {
        let pushed = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(frame);
            }

            let pushed = if state.frames.len() >= state.capacity {
                state.frames.pop_front();
                Pushed::DroppedOldest
            } else {
                Pushed::Queued
            };
            state.frames.push_back(frame);
            pushed
        };

        self.shared.notify.notify_one();
        Ok(pushed)
    }

    /// Close the queue, waking the receiver
    pub(crate) fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.frames.clear();
        }
        self.shared.notify.notify_one();
    }

    pub(crate) fn len(&self) -> usize {
        self.shared.state.lock().frames.len()
    }
}

impl<T> OutboundQueue<T> {
    /// Registry session id this queue belongs to
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Wait for the next frame
    ///
    /// Returns `None` once the queue has been closed.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(next) = self.poll_state() {
                return next;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost
            self.shared.notify.notified().await;
        }
    }

    /// Take the next frame without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.poll_state().flatten()
    }

    /// Number of frames waiting to be received
    pub fn len(&self) -> usize {
        self.shared.state.lock().frames.len()
    }

    /// Whether no frames are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the owning session has been deactivated
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    fn poll_state(&self) -> Option<Option<T>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Some(None);
        }
        state.frames.pop_front().map(Some)
    }
}

impl<T> std::fmt::Debug for OutboundQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("session_id", &self.session_id)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
