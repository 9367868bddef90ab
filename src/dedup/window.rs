//! Uplink deduplication windows
//!
//! The first reception of a transmission opens a window. Receptions of the
//! same fingerprint arriving before the window's deadline are merged into it;
//! when the deadline fires the best reception is delivered to the owning
//! handler and the window is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::directory::{DeviceDirectory, DirectoryError};
use crate::message::{Fingerprint, HandlerId, RouterId, UplinkDelivery, UplinkFrame};
use crate::registry::{EnqueueOutcome, HandlerRegistry};
use crate::stats::BrokerMetrics;

use super::policy::{QualityPolicy, RssiPolicy};

/// Default collection window
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(200);

/// Open collection window for one fingerprint
#[derive(Debug)]
struct DedupEntry {
    /// Distinguishes successive windows of the same fingerprint
    window_id: u64,
    /// Best reception seen so far
    best: UplinkFrame,
    /// Reporting routers in arrival order
    reported_by: Vec<RouterId>,
    deadline: Instant,
}

impl DedupEntry {
    fn open(window_id: u64, frame: UplinkFrame, deadline: Instant) -> Self {
        let reported_by = vec![frame.metadata.router_id.clone()];
        Self {
            window_id,
            best: frame,
            reported_by,
            deadline,
        }
    }

    /// Merge a duplicate; returns true if it became the best candidate
    fn merge(&mut self, frame: UplinkFrame, policy: &dyn QualityPolicy) -> bool {
        if !self.reported_by.contains(&frame.metadata.router_id) {
            self.reported_by.push(frame.metadata.router_id.clone());
        }

        if policy.is_better(&frame.metadata, &self.best.metadata) {
            self.best = frame;
            true
        } else {
            false
        }
    }
}

/// How a submitted reception was accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First reception: a new window was opened
    Opened,
    /// Merged into an open window
    Merged {
        /// Whether the reception replaced the previous best candidate
        replaced: bool,
    },
    /// Arrived after the previous window's deadline: that window was closed
    /// and a new one opened
    Reopened,
}

/// What happened when a window closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queued to the owning handler
    Delivered {
        handler: HandlerId,
        outcome: EnqueueOutcome,
    },
    /// The directory could not resolve an owner; the uplink was dropped
    Unroutable(DirectoryError),
    /// The owner has no active session; the uplink was dropped
    HandlerInactive(HandlerId),
}

/// Collapses duplicate receptions into one delivery per transmission
pub struct UplinkDeduplicator<D> {
    entries: Mutex<HashMap<Fingerprint, DedupEntry>>,
    window: Duration,
    policy: Arc<dyn QualityPolicy>,
    directory: Arc<D>,
    handlers: Arc<HandlerRegistry>,
    metrics: Arc<BrokerMetrics>,
    next_window_id: AtomicU64,
}

impl<D: DeviceDirectory> UplinkDeduplicator<D> {
    /// Create a deduplicator ranking receptions by RSSI
    pub fn new(
        window: Duration,
        directory: Arc<D>,
        handlers: Arc<HandlerRegistry>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            policy: Arc::new(RssiPolicy),
            directory,
            handlers,
            metrics,
            next_window_id: AtomicU64::new(1),
        }
    }

    /// Replace the quality policy
    pub fn with_policy(mut self, policy: Arc<dyn QualityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Length of the collection window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of open windows
    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }

    /// Submit one reception
    ///
    /// Never waits on I/O. Delivery happens on a timer task once the window
    /// closes.
    pub fn submit(self: &Arc<Self>, frame: UplinkFrame) -> SubmitOutcome {
        let fingerprint = frame.fingerprint();
        let now = Instant::now();

        let (outcome, window_id, deadline, expired) = {
            let mut entries = self.entries.lock();

            if let Some(entry) = entries.get_mut(&fingerprint) {
                if now < entry.deadline {
                    let router = frame.metadata.router_id.clone();
                    let replaced = entry.merge(frame, self.policy.as_ref());
                    self.metrics.duplicate_collapsed();

                    tracing::debug!(
                        fingerprint = %fingerprint,
                        router = %router,
                        replaced = replaced,
                        reports = entry.reported_by.len(),
                        "Duplicate uplink merged"
                    );
                    return SubmitOutcome::Merged { replaced };
                }
            }

            // Either no window exists or its deadline has passed. In the
            // latter case the timer has not run yet; the window is closed
            // here and the timer will find nothing to do.
            let expired = entries.remove(&fingerprint);
            let window_id = self.next_window_id.fetch_add(1, Ordering::Relaxed);
            let deadline = now + self.window;
            entries.insert(fingerprint, DedupEntry::open(window_id, frame, deadline));

            let outcome = if expired.is_some() {
                SubmitOutcome::Reopened
            } else {
                SubmitOutcome::Opened
            };
            (outcome, window_id, deadline, expired)
        };

        tracing::debug!(
            fingerprint = %fingerprint,
            window_id = window_id,
            window_ms = self.window.as_millis() as u64,
            "Dedup window opened"
        );

        if let Some(expired) = expired {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.deliver(expired).await;
            });
        }
        self.arm(fingerprint, window_id, deadline);

        outcome
    }

    /// Close every open window now and deliver its best reception
    pub async fn flush(&self) -> Vec<DeliveryOutcome> {
        let drained: Vec<DedupEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();

        let mut outcomes = Vec::with_capacity(drained.len());
        for entry in drained {
            outcomes.push(self.deliver(entry).await);
        }
        outcomes
    }

    fn arm(self: &Arc<Self>, fingerprint: Fingerprint, window_id: u64, deadline: Instant) {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(entry) = this.close(&fingerprint, window_id) {
                this.deliver(entry).await;
            }
        });
    }

    /// Remove the window if it is still the one this timer was armed for
    fn close(&self, fingerprint: &Fingerprint, window_id: u64) -> Option<DedupEntry> {
        let mut entries = self.entries.lock();
        match entries.get(fingerprint) {
            Some(entry) if entry.window_id == window_id => entries.remove(fingerprint),
            _ => None,
        }
    }

    async fn deliver(&self, entry: DedupEntry) -> DeliveryOutcome {
        let dev_addr = entry.best.dev_addr;
        let fcnt = entry.best.fcnt;

        let handler = match self.directory.resolve_handler(dev_addr).await {
            Ok(handler) => handler,
            Err(e) => {
                self.metrics.uplink_unroutable();
                tracing::warn!(
                    dev_addr = %dev_addr,
                    fcnt = fcnt,
                    error = %e,
                    "Unroutable device, uplink dropped"
                );
                return DeliveryOutcome::Unroutable(e);
            }
        };

        let reports = entry.reported_by.len();
        let best_router = entry.best.metadata.router_id.clone();
        let delivery = UplinkDelivery {
            uplink: entry.best,
            reported_by: entry.reported_by,
        };

        match self.handlers.enqueue(&handler, delivery) {
            Ok(outcome) => {
                self.metrics.uplink_delivered();
                if outcome == EnqueueOutcome::Backpressure {
                    self.metrics.backpressure_drop();
                }
                tracing::debug!(
                    dev_addr = %dev_addr,
                    fcnt = fcnt,
                    handler = %handler,
                    router = %best_router,
                    reports = reports,
                    "Uplink delivered"
                );
                DeliveryOutcome::Delivered { handler, outcome }
            }
            Err(e) => {
                self.metrics.uplink_dropped_inactive();
                tracing::warn!(
                    dev_addr = %dev_addr,
                    fcnt = fcnt,
                    handler = %handler,
                    error = %e,
                    "Handler not active, uplink dropped"
                );
                DeliveryOutcome::HandlerInactive(handler)
            }
        }
    }
}
