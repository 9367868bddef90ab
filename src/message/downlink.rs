//! Downlink frame types

use bytes::Bytes;

use super::ids::{DevAddr, RouterId};
use super::MAX_PHY_PAYLOAD;

/// A frame a handler wants transmitted to a device
///
/// Handlers submit frames with an empty `routers` list; the downlink router
/// fills in the resolved targets before the frame is queued to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkFrame {
    /// Target device
    pub dev_addr: DevAddr,
    /// Opaque PHY payload
    pub payload: Bytes,
    /// Routers the frame was routed to
    pub routers: Vec<RouterId>,
}

impl DownlinkFrame {
    /// Create an unrouted downlink frame
    pub fn new(dev_addr: DevAddr, payload: Bytes) -> Self {
        Self {
            dev_addr,
            payload,
            routers: Vec::new(),
        }
    }

    /// Attach the resolved target routers
    pub fn with_routers(mut self, routers: Vec<RouterId>) -> Self {
        self.routers = routers;
        self
    }

    /// Structural validity check applied before a frame reaches the core
    pub fn is_well_formed(&self) -> bool {
        !self.payload.is_empty() && self.payload.len() <= MAX_PHY_PAYLOAD
    }
}
