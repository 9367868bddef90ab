//! Frames and identifiers exchanged between routers, handlers and the broker

pub mod activation;
pub mod downlink;
pub mod ids;
pub mod uplink;

pub use activation::{ActivationKey, ActivationRequest, ActivationResponse};
pub use downlink::DownlinkFrame;
pub use ids::{AppEui, DevAddr, DevEui, DevNonce, HandlerId, RouterId};
pub use uplink::{Fingerprint, RxMetadata, UplinkDelivery, UplinkFrame};

/// Largest PHY payload accepted from routers or handlers
pub const MAX_PHY_PAYLOAD: usize = 255;
