//! Session registries for routers and handlers
//!
//! A registry tracks the active sessions of one kind and owns the sending end
//! of each session's bounded outbound queue. Routers receive downlinks through
//! the `RouterRegistry`; handlers receive deduplicated uplinks through the
//! `HandlerRegistry`.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<SessionRegistry<K, T>>
//!                     ┌──────────────────────────┐
//!                     │ sessions: HashMap<K,     │
//!                     │   SessionEntry {         │
//!                     │     session_id,          │
//!                     │     tx: QueueSender<T>,  │
//!                     │   }                      │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │ enqueue(id, frame)
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//!  OutboundQueue<T>         OutboundQueue<T>         OutboundQueue<T>
//!  session task recv()      session task recv()      session task recv()
//! ```
//!
//! # Overflow
//!
//! Queues are bounded. When a queue is full the oldest pending frame is
//! dropped in favor of the new one, and the enqueue reports
//! `EnqueueOutcome::Backpressure`.

pub mod config;
pub mod entry;
pub mod error;
pub mod queue;
pub mod store;

pub use config::RegistryConfig;
pub use entry::SessionStats;
pub use error::RegistryError;
pub use queue::OutboundQueue;
pub use store::{EnqueueOutcome, HandlerRegistry, RouterRegistry, SessionGuard, SessionRegistry};
