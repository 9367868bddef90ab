//! Downlink routing
//!
//! Device-to-router affinity is learned from uplink traffic: every router
//! that reports a device's uplink becomes a downlink candidate for that
//! device until its sighting goes stale.

pub mod affinity;
pub mod downlink;

pub use affinity::{AffinityTable, DEFAULT_AFFINITY_FRESHNESS};
pub use downlink::{DownlinkReport, DownlinkRouter};
