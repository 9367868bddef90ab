//! Broker-wide counters
//!
//! Conditions that are absorbed rather than propagated are counted here in
//! addition to being logged.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by all broker components
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    uplinks_received: AtomicU64,
    duplicates_collapsed: AtomicU64,
    uplinks_delivered: AtomicU64,
    uplinks_unroutable: AtomicU64,
    uplinks_dropped_inactive: AtomicU64,
    backpressure_drops: AtomicU64,
    downlinks_routed: AtomicU64,
    downlinks_no_route: AtomicU64,
    activations_started: AtomicU64,
    activations_replayed: AtomicU64,
    activations_timed_out: AtomicU64,
    activations_failed: AtomicU64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(uplink_received, uplinks_received);
    counter!(duplicate_collapsed, duplicates_collapsed);
    counter!(uplink_delivered, uplinks_delivered);
    counter!(uplink_unroutable, uplinks_unroutable);
    counter!(uplink_dropped_inactive, uplinks_dropped_inactive);
    counter!(backpressure_drop, backpressure_drops);
    counter!(downlink_routed, downlinks_routed);
    counter!(downlink_no_route, downlinks_no_route);
    counter!(activation_started, activations_started);
    counter!(activation_replayed, activations_replayed);
    counter!(activation_timed_out, activations_timed_out);
    counter!(activation_failed, activations_failed);

    /// Take a point-in-time copy of all counters
    pub fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            uplinks_received: self.uplinks_received.load(Ordering::Relaxed),
            duplicates_collapsed: self.duplicates_collapsed.load(Ordering::Relaxed),
            uplinks_delivered: self.uplinks_delivered.load(Ordering::Relaxed),
            uplinks_unroutable: self.uplinks_unroutable.load(Ordering::Relaxed),
            uplinks_dropped_inactive: self.uplinks_dropped_inactive.load(Ordering::Relaxed),
            backpressure_drops: self.backpressure_drops.load(Ordering::Relaxed),
            downlinks_routed: self.downlinks_routed.load(Ordering::Relaxed),
            downlinks_no_route: self.downlinks_no_route.load(Ordering::Relaxed),
            activations_started: self.activations_started.load(Ordering::Relaxed),
            activations_replayed: self.activations_replayed.load(Ordering::Relaxed),
            activations_timed_out: self.activations_timed_out.load(Ordering::Relaxed),
            activations_failed: self.activations_failed.load(Ordering::Relaxed),
            active_routers: 0,
            active_handlers: 0,
        }
    }
}

/// Broker-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Uplink receptions accepted from routers
    pub uplinks_received: u64,
    /// Receptions merged into an already open dedup window
    pub duplicates_collapsed: u64,
    /// Deduplicated uplinks handed to a handler queue
    pub uplinks_delivered: u64,
    /// Deduplicated uplinks dropped because no handler could be resolved
    pub uplinks_unroutable: u64,
    /// Deduplicated uplinks dropped because the owning handler had no session
    pub uplinks_dropped_inactive: u64,
    /// Frames dropped from full outbound queues
    pub backpressure_drops: u64,
    /// Downlink submissions accepted by at least one router
    pub downlinks_routed: u64,
    /// Downlink submissions with no reachable router
    pub downlinks_no_route: u64,
    /// Activation attempts that queried a handler
    pub activations_started: u64,
    /// Requests answered from a cached activation outcome
    pub activations_replayed: u64,
    /// Activation attempts that hit their deadline
    pub activations_timed_out: u64,
    /// Activation attempts rejected or failed by the handler or directory
    pub activations_failed: u64,
    /// Currently active router sessions
    pub active_routers: usize,
    /// Currently active handler sessions
    pub active_handlers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let stats = BrokerMetrics::new().snapshot();
        assert_eq!(stats, BrokerStats::default());
    }

    #[test]
    fn test_counters_increment_independently() {
        let metrics = BrokerMetrics::new();

        metrics.uplink_received();
        metrics.uplink_received();
        metrics.duplicate_collapsed();
        metrics.activation_timed_out();

        let stats = metrics.snapshot();
        assert_eq!(stats.uplinks_received, 2);
        assert_eq!(stats.duplicates_collapsed, 1);
        assert_eq!(stats.activations_timed_out, 1);
        assert_eq!(stats.uplinks_delivered, 0);
    }
}
