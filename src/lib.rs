//! # lora-broker
//!
//! Routing core of a LoRaWAN-style broker. Routers (gateways) report every
//! uplink they hear; handlers own devices and applications. The broker sits
//! in between:
//!
//! - Duplicate receptions of one uplink are collapsed into a single delivery
//!   carrying the best-quality reception.
//! - Downlinks from a handler are routed to the routers that recently heard
//!   the device.
//! - Join requests reported by several routers trigger one handler query,
//!   whose answer goes back to every router that asked.
//!
//! The crate has no wire protocol of its own. A streaming adapter
//! authenticates each connection, calls [`Broker::associate`],
//! [`Broker::subscribe`], [`Broker::publish`] or [`Broker::activate`], and
//! drives the returned session objects.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lora_broker::{
//!     ActivationError, ActivationRequest, ActivationResponse, Broker, BrokerConfig, HandlerActivator,
//!     HandlerId, Identity, StaticDirectory,
//! };
//!
//! struct Activator;
//!
//! impl HandlerActivator for Activator {
//!     async fn activate(
//!         &self,
//!         _handler: &HandlerId,
//!         _request: ActivationRequest,
//!     ) -> Result<ActivationResponse, ActivationError> {
//!         Err(ActivationError::Rejected("joins disabled".into()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> lora_broker::Result<()> {
//!     let broker = Arc::new(Broker::new(BrokerConfig::default(), StaticDirectory::new(), Activator));
//!
//!     let mut session = broker.associate(&Identity::router("router-1"))?;
//!     while let Some(downlink) = session.recv_downlink().await {
//!         println!("transmit {} bytes to {}", downlink.payload.len(), downlink.dev_addr);
//!     }
//!     Ok(())
//! }
//! ```

pub mod activation;
pub mod dedup;
pub mod directory;
pub mod error;
pub mod message;
pub mod registry;
pub mod routing;
pub mod server;
pub mod session;
pub mod stats;

pub use activation::{ActivationCoordinator, ActivationError, AttemptState, HandlerActivator};
pub use dedup::{QualityPolicy, RssiPolicy, SubmitOutcome, UplinkDeduplicator};
pub use directory::{DeviceDirectory, DirectoryError, StaticDirectory};
pub use error::{Error, Result, StatusCode};
pub use message::{
    ActivationRequest, ActivationResponse, AppEui, DevAddr, DevEui, DevNonce, DownlinkFrame,
    HandlerId, RouterId, RxMetadata, UplinkDelivery, UplinkFrame,
};
pub use registry::{EnqueueOutcome, RegistryConfig};
pub use routing::DownlinkReport;
pub use server::{Broker, BrokerConfig};
pub use session::{
    ConnectionContext, DownlinkPublisher, HandlerSubscription, Identity, NetworkContextValidator,
    RouterSession, StaticTokenValidator,
};
pub use stats::BrokerStats;
