//! Signal-quality comparison policies
//!
//! The deduplicator keeps the best reception of a transmission. What "best"
//! means is pluggable: some deployments rank by RSSI, others by SNR, others
//! by a link-budget estimate combining both.

use std::cmp::Ordering;

use crate::message::RxMetadata;

/// Ranks two receptions of the same transmission
pub trait QualityPolicy: Send + Sync + 'static {
    /// Compare `candidate` against `best`; `Greater` means the candidate is better
    fn compare(&self, candidate: &RxMetadata, best: &RxMetadata) -> Ordering;

    /// Whether `candidate` should replace `best`
    ///
    /// Only a strictly better candidate replaces the current best, so among
    /// equals the first reception seen is kept.
    fn is_better(&self, candidate: &RxMetadata, best: &RxMetadata) -> bool {
        self.compare(candidate, best) == Ordering::Greater
    }
}

/// Higher RSSI wins
#[derive(Debug, Clone, Copy, Default)]
pub struct RssiPolicy;

impl QualityPolicy for RssiPolicy {
    fn compare(&self, candidate: &RxMetadata, best: &RxMetadata) -> Ordering {
        candidate.rssi.total_cmp(&best.rssi)
    }
}

/// Higher SNR wins, RSSI breaks ties
#[derive(Debug, Clone, Copy, Default)]
pub struct SnrPolicy;

impl QualityPolicy for SnrPolicy {
    fn compare(&self, candidate: &RxMetadata, best: &RxMetadata) -> Ordering {
        candidate
            .snr
            .total_cmp(&best.snr)
            .then_with(|| candidate.rssi.total_cmp(&best.rssi))
    }
}

/// Ranks by effective signal strength: RSSI plus SNR when SNR is negative
///
/// Below the noise floor RSSI overstates link quality; folding in the
/// negative SNR approximates the usable signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkBudgetPolicy;

impl LinkBudgetPolicy {
    fn effective(meta: &RxMetadata) -> f32 {
        meta.rssi + meta.snr.min(0.0)
    }
}

impl QualityPolicy for LinkBudgetPolicy {
    fn compare(&self, candidate: &RxMetadata, best: &RxMetadata) -> Ordering {
        Self::effective(candidate).total_cmp(&Self::effective(best))
    }
}
