//! Router session
//!
//! An associated router streams uplink receptions in and receives the
//! downlinks routed to it. The session splits into an `UplinkSink` for the
//! inbound reader and a `DownlinkSource` for the outbound forwarder; both
//! halves share one registry lease, released when the last half is dropped.

use std::future::Future;
use std::sync::Arc;

use crate::activation::HandlerActivator;
use crate::dedup::SubmitOutcome;
use crate::directory::DeviceDirectory;
use crate::error::Result;
use crate::message::{DownlinkFrame, RouterId, UplinkFrame};
use crate::registry::{OutboundQueue, SessionGuard};
use crate::server::Broker;

use super::forward::{self, ForwardEnd};

/// Exclusive hold on a router id
///
/// Dropping the lease forgets the router's learned affinity and deactivates
/// its registry session. Both are skipped once a successor session holds the
/// same router id.
struct RouterLease<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    broker: Arc<Broker<D, A>>,
    guard: SessionGuard<RouterId, DownlinkFrame>,
}

impl<D, A> Drop for RouterLease<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    fn drop(&mut self) {
        self.broker.release_router(self.guard.id(), self.guard.session_id());
    }
}

/// An associated router
pub struct RouterSession<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    uplinks: UplinkSink<D, A>,
    downlinks: DownlinkSource<D, A>,
}

impl<D, A> RouterSession<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    pub(crate) fn new(
        broker: Arc<Broker<D, A>>,
        guard: SessionGuard<RouterId, DownlinkFrame>,
        queue: OutboundQueue<DownlinkFrame>,
    ) -> Self {
        let lease = Arc::new(RouterLease { broker, guard });

        Self {
            uplinks: UplinkSink {
                lease: Arc::clone(&lease),
            },
            downlinks: DownlinkSource { lease, queue },
        }
    }

    /// The associated router
    pub fn router_id(&self) -> &RouterId {
        self.uplinks.router_id()
    }

    /// Submit one uplink reception
    pub fn submit_uplink(&self, frame: UplinkFrame) -> Result<SubmitOutcome> {
        self.uplinks.submit(frame)
    }

    /// Wait for the next downlink; `None` once the session is deactivated
    pub async fn recv_downlink(&mut self) -> Option<DownlinkFrame> {
        self.downlinks.recv().await
    }

    /// Split into independently owned halves
    pub fn split(self) -> (UplinkSink<D, A>, DownlinkSource<D, A>) {
        (self.uplinks, self.downlinks)
    }
}

impl<D, A> std::fmt::Debug for RouterSession<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSession")
            .field("router_id", self.router_id())
            .field("queue", &self.downlinks.queue)
            .finish()
    }
}

/// Inbound half of a router session
pub struct UplinkSink<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    lease: Arc<RouterLease<D, A>>,
}

impl<D, A> Clone for UplinkSink<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    fn clone(&self) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
        }
    }
}

impl<D, A> UplinkSink<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    pub fn router_id(&self) -> &RouterId {
        self.lease.guard.id()
    }

    /// Submit one uplink reception
    ///
    /// A malformed frame, or one attributed to another router, is rejected
    /// with `InvalidArgument`; the session stays usable. Once the session has
    /// been deactivated every submission fails with `NotFound`.
    pub fn submit(&self, frame: UplinkFrame) -> Result<SubmitOutcome> {
        let guard = &self.lease.guard;
        self.lease
            .broker
            .submit_uplink(guard.id(), guard.session_id(), frame)
    }
}

/// Outbound half of a router session
pub struct DownlinkSource<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    lease: Arc<RouterLease<D, A>>,
    queue: OutboundQueue<DownlinkFrame>,
}

impl<D, A> DownlinkSource<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    pub fn router_id(&self) -> &RouterId {
        self.lease.guard.id()
    }

    /// Wait for the next downlink; `None` once the session is deactivated
    pub async fn recv(&mut self) -> Option<DownlinkFrame> {
        self.queue.recv().await
    }

    /// Take a pending downlink without waiting
    pub fn try_recv(&mut self) -> Option<DownlinkFrame> {
        self.queue.try_recv()
    }

    /// Number of downlinks waiting to be sent
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Forward downlinks to the router until `shutdown` resolves or the
    /// session is deactivated
    pub async fn forward<F, S, Fut, E>(
        &mut self,
        shutdown: F,
        send: S,
    ) -> std::result::Result<ForwardEnd, E>
    where
        F: Future<Output = ()>,
        S: FnMut(DownlinkFrame) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let end = forward::forward(&mut self.queue, shutdown, send).await?;
        tracing::debug!(router = %self.router_id(), end = ?end, "Downlink forwarder stopped");
        Ok(end)
    }
}
