//! Handler sessions
//!
//! A handler subscribes to the deduplicated uplinks of the devices it owns
//! and publishes downlinks for them. The two directions are separate
//! sessions, as they are separate streams on the wire.

use std::future::Future;
use std::sync::Arc;

use crate::activation::HandlerActivator;
use crate::directory::DeviceDirectory;
use crate::error::Result;
use crate::message::{DownlinkFrame, HandlerId, UplinkDelivery};
use crate::registry::{OutboundQueue, SessionGuard};
use crate::routing::DownlinkReport;
use crate::server::Broker;

use super::forward::{self, ForwardEnd};

/// Uplink subscription of one handler
///
/// Dropping the subscription deactivates the handler's session.
pub struct HandlerSubscription {
    guard: SessionGuard<HandlerId, UplinkDelivery>,
    queue: OutboundQueue<UplinkDelivery>,
}

impl HandlerSubscription {
    pub(crate) fn new(
        guard: SessionGuard<HandlerId, UplinkDelivery>,
        queue: OutboundQueue<UplinkDelivery>,
    ) -> Self {
        Self { guard, queue }
    }

    pub fn handler_id(&self) -> &HandlerId {
        self.guard.id()
    }

    /// Wait for the next uplink; `None` once the session is deactivated
    pub async fn recv(&mut self) -> Option<UplinkDelivery> {
        self.queue.recv().await
    }

    /// Take a pending uplink without waiting
    pub fn try_recv(&mut self) -> Option<UplinkDelivery> {
        self.queue.try_recv()
    }

    /// Number of uplinks waiting to be sent
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Forward uplinks to the handler until `shutdown` resolves or the
    /// session is deactivated
    pub async fn forward<F, S, Fut, E>(
        &mut self,
        shutdown: F,
        send: S,
    ) -> std::result::Result<ForwardEnd, E>
    where
        F: Future<Output = ()>,
        S: FnMut(UplinkDelivery) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let end = forward::forward(&mut self.queue, shutdown, send).await?;
        tracing::debug!(handler = %self.handler_id(), end = ?end, "Uplink forwarder stopped");
        Ok(end)
    }
}

impl std::fmt::Debug for HandlerSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSubscription")
            .field("handler_id", self.handler_id())
            .field("queue", &self.queue)
            .finish()
    }
}

/// Downlink publishing stream of one handler
pub struct DownlinkPublisher<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    handler_id: HandlerId,
    broker: Arc<Broker<D, A>>,
}

impl<D, A> DownlinkPublisher<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    pub(crate) fn new(handler_id: HandlerId, broker: Arc<Broker<D, A>>) -> Self {
        Self { handler_id, broker }
    }

    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    /// Route one downlink to the routers that can reach its device
    ///
    /// Errors are scoped to this frame; the stream stays usable.
    pub async fn publish(&self, frame: DownlinkFrame) -> Result<DownlinkReport> {
        self.broker.publish_downlink(&self.handler_id, frame).await
    }
}
