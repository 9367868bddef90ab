//! Device activation (join) coordination
//!
//! ```text
//!   Init ──resolve handler──► AwaitingHandler ──answer──► Completed
//!                                   │                  └► Failed
//!                                   └──deadline───────────► TimedOut
//! ```
//!
//! Terminal attempts answer duplicates from cache until the retention window
//! passes; after that the same key starts a fresh attempt.

pub mod attempt;
pub mod coordinator;

pub use attempt::{ActivationError, ActivationOutcome, AttemptState};
pub use coordinator::{
    ActivationCoordinator, HandlerActivator, DEFAULT_ACTIVATION_RETENTION,
    DEFAULT_ACTIVATION_TIMEOUT,
};
