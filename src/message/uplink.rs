//! Uplink frame types
//!
//! An uplink is a frame transmitted once by a device and received by every
//! router in range. Each reception arrives as its own `UplinkFrame` carrying
//! the reporting router's signal metadata; the `Fingerprint` identifies the
//! physical transmission shared by all of those copies.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use tokio::time::Instant;

use super::ids::{DevAddr, RouterId};
use super::MAX_PHY_PAYLOAD;

/// Per-reception metadata reported by a router
#[derive(Debug, Clone, PartialEq)]
pub struct RxMetadata {
    /// Router that received the transmission
    pub router_id: RouterId,
    /// Received signal strength in dBm
    pub rssi: f32,
    /// Signal-to-noise ratio in dB
    pub snr: f32,
    /// When the broker accepted this reception
    pub received_at: Instant,
}

impl RxMetadata {
    /// Create metadata stamped with the current time
    pub fn new(router_id: RouterId, rssi: f32, snr: f32) -> Self {
        Self {
            router_id,
            rssi,
            snr,
            received_at: Instant::now(),
        }
    }
}

/// Value identifying a single physical transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame counter
    pub fcnt: u32,
    /// Digest of the raw payload
    pub digest: u64,
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{:016x}", self.dev_addr, self.fcnt, self.digest)
    }
}

/// A single reception of an uplink transmission
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkFrame {
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame counter
    pub fcnt: u32,
    /// Opaque PHY payload (reference-counted, cheap to clone)
    pub payload: Bytes,
    /// Reception metadata
    pub metadata: RxMetadata,
}

impl UplinkFrame {
    /// Create an uplink frame
    pub fn new(dev_addr: DevAddr, fcnt: u32, payload: Bytes, metadata: RxMetadata) -> Self {
        Self {
            dev_addr,
            fcnt,
            payload,
            metadata,
        }
    }

    /// Fingerprint of the transmission this frame is a reception of
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = DefaultHasher::new();
        self.payload.hash(&mut hasher);

        Fingerprint {
            dev_addr: self.dev_addr,
            fcnt: self.fcnt,
            digest: hasher.finish(),
        }
    }

    /// Router that reported this reception
    pub fn router_id(&self) -> &RouterId {
        &self.metadata.router_id
    }

    /// Structural validity check applied before a frame reaches the core
    pub fn is_well_formed(&self) -> bool {
        !self.payload.is_empty()
            && self.payload.len() <= MAX_PHY_PAYLOAD
            && !self.metadata.router_id.as_str().is_empty()
            && self.metadata.rssi.is_finite()
            && self.metadata.snr.is_finite()
    }
}

/// A deduplicated uplink as delivered to a handler
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkDelivery {
    /// The best-quality reception of the transmission
    pub uplink: UplinkFrame,
    /// Every router that reported the transmission, in arrival order
    pub reported_by: Vec<RouterId>,
}
