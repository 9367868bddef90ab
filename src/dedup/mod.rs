//! Uplink deduplication
//!
//! Every router in range of a device receives the same transmission and
//! reports it. The deduplicator collects those reports for a short fixed
//! window and delivers exactly one of them, the best by signal quality, to
//! the handler that owns the device.
//!
//! ```text
//!  router A ──┐
//!  router B ──┼──► submit() ──► window[fingerprint] ──(deadline)──► directory ──► handler queue
//!  router C ──┘                 best candidate + reporters
//! ```

pub mod policy;
pub mod window;

pub use policy::{LinkBudgetPolicy, QualityPolicy, RssiPolicy, SnrPolicy};
pub use window::{DeliveryOutcome, SubmitOutcome, UplinkDeduplicator, DEFAULT_DEDUP_WINDOW};
