//! Session types handed to the streaming adapter

pub mod context;
pub mod forward;
pub mod handler;
pub mod router;

pub use context::{
    AuthError, ConnectionContext, Identity, NetworkContextValidator, Role, StaticTokenValidator,
};
pub use forward::{forward, ForwardEnd};
pub use handler::{DownlinkPublisher, HandlerSubscription};
pub use router::{DownlinkSource, RouterSession, UplinkSink};
