//! Downlink routing
//!
//! Resolves the routers able to reach a device and queues the handler's
//! frame to each of them. Candidates come from the affinity table first and
//! from the directory when nothing fresh has been learned.

use std::sync::Arc;

use tokio::time::Instant;

use crate::directory::DeviceDirectory;
use crate::error::{Error, Result};
use crate::message::{DevAddr, DownlinkFrame, RouterId, UplinkFrame};
use crate::registry::{EnqueueOutcome, RegistryError, RouterRegistry};
use crate::stats::BrokerMetrics;

use super::affinity::AffinityTable;

/// Per-target result of routing one downlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkReport {
    /// Target device
    pub dev_addr: DevAddr,
    /// Routers whose queue accepted the frame
    pub delivered: Vec<RouterId>,
    /// Subset of `delivered` whose queue was full and dropped an older frame
    pub backpressured: Vec<RouterId>,
    /// Routers that could not take the frame
    pub failed: Vec<(RouterId, RegistryError)>,
}

/// Routes handler downlinks to router sessions
pub struct DownlinkRouter<D> {
    affinity: AffinityTable,
    routers: Arc<RouterRegistry>,
    directory: Arc<D>,
    metrics: Arc<BrokerMetrics>,
}

impl<D: DeviceDirectory> DownlinkRouter<D> {
    pub fn new(
        affinity: AffinityTable,
        routers: Arc<RouterRegistry>,
        directory: Arc<D>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            affinity,
            routers,
            directory,
            metrics,
        }
    }

    /// The learned affinity table
    pub fn affinity(&self) -> &AffinityTable {
        &self.affinity
    }

    /// Learn from an uplink reception that its router reaches the device
    pub fn record_uplink(&self, frame: &UplinkFrame) {
        self.affinity.record(
            frame.dev_addr,
            &frame.metadata.router_id,
            frame.metadata.received_at,
        );
    }

    /// Candidate routers for a device
    pub async fn resolve(&self, dev_addr: DevAddr) -> Vec<RouterId> {
        let learned = self.affinity.routers(dev_addr);
        if !learned.is_empty() {
            return learned;
        }
        self.directory.resolve_routers(dev_addr).await
    }

    /// Route a downlink to every candidate router
    ///
    /// Fails with `NoRoute` if no candidate is known or none accepted the
    /// frame. Partial failures are reported in the `DownlinkReport`.
    pub async fn route(&self, frame: DownlinkFrame) -> Result<DownlinkReport> {
        let dev_addr = frame.dev_addr;
        let started = Instant::now();
        let targets = self.resolve(dev_addr).await;

        if targets.is_empty() {
            self.metrics.downlink_no_route();
            tracing::warn!(dev_addr = %dev_addr, "No router known for device");
            return Err(Error::NoRoute(dev_addr));
        }

        let frame = frame.with_routers(targets.clone());
        let mut report = DownlinkReport {
            dev_addr,
            delivered: Vec::with_capacity(targets.len()),
            backpressured: Vec::new(),
            failed: Vec::new(),
        };

        for router_id in targets {
            match self.routers.enqueue(&router_id, frame.clone()) {
                Ok(outcome) => {
                    if outcome == EnqueueOutcome::Backpressure {
                        self.metrics.backpressure_drop();
                        report.backpressured.push(router_id.clone());
                    }
                    report.delivered.push(router_id);
                }
                Err(e) => {
                    tracing::debug!(
                        dev_addr = %dev_addr,
                        router = %router_id,
                        error = %e,
                        "Downlink target unavailable"
                    );
                    report.failed.push((router_id, e));
                }
            }
        }

        if report.delivered.is_empty() {
            self.metrics.downlink_no_route();
            tracing::warn!(
                dev_addr = %dev_addr,
                candidates = report.failed.len(),
                "No active router for device, downlink dropped"
            );
            return Err(Error::NoRoute(dev_addr));
        }

        self.metrics.downlink_routed();
        tracing::debug!(
            dev_addr = %dev_addr,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Downlink routed"
        );

        Ok(report)
    }
}
