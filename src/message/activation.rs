//! Device activation (join) messages

use bytes::Bytes;

use super::ids::{AppEui, DevAddr, DevEui, DevNonce};
use super::uplink::RxMetadata;
use super::MAX_PHY_PAYLOAD;

/// Key identifying a single join attempt by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationKey {
    pub app_eui: AppEui,
    pub dev_eui: DevEui,
    pub dev_nonce: DevNonce,
}

impl std::fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_eui, self.dev_eui, self.dev_nonce)
    }
}

/// A join request as reported by one router
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationRequest {
    pub app_eui: AppEui,
    pub dev_eui: DevEui,
    pub dev_nonce: DevNonce,
    /// Raw join-request payload
    pub payload: Bytes,
    /// Reception metadata from the reporting router
    pub metadata: RxMetadata,
}

impl ActivationRequest {
    /// Create a join request
    pub fn new(
        app_eui: AppEui,
        dev_eui: DevEui,
        dev_nonce: DevNonce,
        payload: Bytes,
        metadata: RxMetadata,
    ) -> Self {
        Self {
            app_eui,
            dev_eui,
            dev_nonce,
            payload,
            metadata,
        }
    }

    /// Deduplication key of this join attempt
    pub fn key(&self) -> ActivationKey {
        ActivationKey {
            app_eui: self.app_eui,
            dev_eui: self.dev_eui,
            dev_nonce: self.dev_nonce,
        }
    }

    /// Structural validity check applied before a request reaches the core
    pub fn is_well_formed(&self) -> bool {
        !self.payload.is_empty()
            && self.payload.len() <= MAX_PHY_PAYLOAD
            && !self.metadata.router_id.as_str().is_empty()
    }
}

/// The handler's answer to a join request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationResponse {
    /// Address assigned to the device
    pub dev_addr: DevAddr,
    /// Join-accept payload to transmit to the device
    pub payload: Bytes,
}

impl ActivationResponse {
    pub fn new(dev_addr: DevAddr, payload: Bytes) -> Self {
        Self { dev_addr, payload }
    }
}
