//! Broker service
//!
//! `Broker` wires the registries, the uplink deduplicator, the downlink
//! router and the activation coordinator together and exposes the four
//! service operations: associate, subscribe, publish and activate. A
//! streaming adapter authenticates each connection, then drives the returned
//! session objects from its own per-session task.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::activation::{ActivationCoordinator, HandlerActivator};
use crate::dedup::{QualityPolicy, SubmitOutcome, UplinkDeduplicator};
use crate::directory::DeviceDirectory;
use crate::error::{Error, Result};
use crate::message::{
    ActivationRequest, ActivationResponse, DownlinkFrame, HandlerId, RouterId, UplinkFrame,
};
use crate::registry::{HandlerRegistry, RouterRegistry, SessionGuard};
use crate::routing::{AffinityTable, DownlinkReport, DownlinkRouter};
use crate::server::config::BrokerConfig;
use crate::session::{
    AuthError, ConnectionContext, DownlinkPublisher, HandlerSubscription, Identity,
    NetworkContextValidator, RouterSession,
};
use crate::stats::{BrokerMetrics, BrokerStats};

/// Routing core between routers and handlers
pub struct Broker<D, A> {
    config: BrokerConfig,
    directory: Arc<D>,
    routers: Arc<RouterRegistry>,
    handlers: Arc<HandlerRegistry>,
    dedup: Arc<UplinkDeduplicator<D>>,
    downlinks: DownlinkRouter<D>,
    activations: Arc<ActivationCoordinator<D, A>>,
    validator: Option<Box<dyn NetworkContextValidator>>,
    metrics: Arc<BrokerMetrics>,
}

impl<D, A> Broker<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    /// Create a new broker with the given configuration and collaborators
    pub fn new(config: BrokerConfig, directory: D, activator: A) -> Self {
        let directory = Arc::new(directory);
        let metrics = Arc::new(BrokerMetrics::new());
        let routers = Arc::new(RouterRegistry::with_config("router", config.registry.clone()));
        let handlers = Arc::new(HandlerRegistry::with_config("handler", config.registry.clone()));

        let dedup = UplinkDeduplicator::new(
            config.dedup_window,
            Arc::clone(&directory),
            Arc::clone(&handlers),
            Arc::clone(&metrics),
        );
        let downlinks = DownlinkRouter::new(
            AffinityTable::new(config.affinity_freshness),
            Arc::clone(&routers),
            Arc::clone(&directory),
            Arc::clone(&metrics),
        );
        let activations = ActivationCoordinator::new(
            Arc::clone(&directory),
            Arc::new(activator),
            Arc::clone(&metrics),
            config.activation_timeout,
            config.activation_retention,
        );

        Self {
            config,
            directory,
            routers,
            handlers,
            dedup: Arc::new(dedup),
            downlinks,
            activations: Arc::new(activations),
            validator: None,
            metrics,
        }
    }

    /// Authenticate connections with `validator`
    pub fn with_validator(mut self, validator: impl NetworkContextValidator) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Rank duplicate receptions with `policy` instead of RSSI
    pub fn with_quality_policy(self, policy: Arc<dyn QualityPolicy>) -> Self {
        let dedup = UplinkDeduplicator::new(
            self.config.dedup_window,
            Arc::clone(&self.directory),
            Arc::clone(&self.handlers),
            Arc::clone(&self.metrics),
        )
        .with_policy(policy);

        Self {
            dedup: Arc::new(dedup),
            ..self
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Registry of router sessions
    pub fn routers(&self) -> &Arc<RouterRegistry> {
        &self.routers
    }

    /// Registry of handler sessions
    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// Learned router affinity
    pub fn affinity(&self) -> &AffinityTable {
        self.downlinks.affinity()
    }

    /// Activation coordinator, for inspecting attempt state
    pub fn activations(&self) -> &Arc<ActivationCoordinator<D, A>> {
        &self.activations
    }

    /// Validate a connection once and return the caller's identity
    pub fn authenticate(&self, ctx: &ConnectionContext) -> Result<Identity> {
        let validator = self.validator.as_ref().ok_or(AuthError::NoValidator)?;

        validator.validate(ctx).map_err(|e| {
            tracing::warn!(peer = ?ctx.peer_addr, error = %e, "Authentication failed");
            Error::from(e)
        })
    }

    /// Associate a router: exclusive for its id until the session is dropped
    pub fn associate(self: &Arc<Self>, identity: &Identity) -> Result<RouterSession<D, A>> {
        let router_id = require_router(identity, "associate")?;
        let queue = self.routers.activate(&router_id)?;
        let guard = SessionGuard::new(Arc::clone(&self.routers), router_id, queue.session_id());

        Ok(RouterSession::new(Arc::clone(self), guard, queue))
    }

    /// Subscribe a handler to its deduplicated uplinks
    pub fn subscribe(&self, identity: &Identity) -> Result<HandlerSubscription> {
        let handler_id = require_handler(identity, "subscribe")?;
        let queue = self.handlers.activate(&handler_id)?;
        let guard = SessionGuard::new(Arc::clone(&self.handlers), handler_id, queue.session_id());

        Ok(HandlerSubscription::new(guard, queue))
    }

    /// Open a downlink publishing stream for a handler
    pub fn publish(self: &Arc<Self>, identity: &Identity) -> Result<DownlinkPublisher<D, A>> {
        let handler_id = require_handler(identity, "publish")?;
        tracing::info!(handler = %handler_id, "Downlink publisher opened");

        Ok(DownlinkPublisher::new(handler_id, Arc::clone(self)))
    }

    /// Forward a router's join request to the owning handler
    ///
    /// Duplicate requests from other routers share one handler query and
    /// receive the same answer.
    pub async fn activate(
        &self,
        identity: &Identity,
        request: ActivationRequest,
    ) -> Result<ActivationResponse> {
        let router_id = require_router(identity, "activate")?;

        if !request.is_well_formed() {
            return Err(Error::InvalidArgument(format!(
                "malformed activation request for {}",
                request.key()
            )));
        }
        if request.metadata.router_id != router_id {
            return Err(Error::InvalidArgument(format!(
                "activation request reported by {} on session of {}",
                request.metadata.router_id, router_id
            )));
        }

        Ok(self.activations.activate(router_id, request).await?)
    }

    /// Forcibly end a router's session; its forwarder returns promptly
    pub fn disconnect_router(&self, router_id: &RouterId) -> bool {
        self.forget_router(router_id);
        self.routers.deactivate(router_id)
    }

    /// Forcibly end a handler's subscription; its forwarder returns promptly
    pub fn disconnect_handler(&self, handler_id: &HandlerId) -> bool {
        self.handlers.deactivate(handler_id)
    }

    /// Close every open dedup window now and deliver its best reception
    pub async fn flush_uplinks(&self) -> usize {
        self.dedup.flush().await.len()
    }

    /// Current broker-wide statistics
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            active_routers: self.routers.len(),
            active_handlers: self.handlers.len(),
            ..self.metrics.snapshot()
        }
    }

    /// Purge stale affinity entries and expired activation attempts
    pub fn cleanup(&self) {
        let affinity = self.downlinks.affinity().purge();
        let attempts = self.activations.purge_expired();

        if affinity > 0 || attempts > 0 {
            tracing::debug!(
                affinity_purged = affinity,
                attempts_purged = attempts,
                "Broker cleanup"
            );
        }
    }

    /// Spawn the periodic cleanup task
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        let interval = broker.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broker.cleanup();
            }
        })
    }

    /// Run housekeeping until `shutdown` resolves, then flush open windows
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let cleanup_handle = self.spawn_cleanup_task();
        tracing::info!(
            dedup_window_ms = self.config.dedup_window.as_millis() as u64,
            queue_capacity = self.config.registry.queue_capacity,
            "Broker running"
        );

        shutdown.await;
        tracing::info!("Shutdown signal received");

        cleanup_handle.abort();
        let flushed = self.flush_uplinks().await;
        tracing::info!(flushed = flushed, "Broker stopped");
    }

    pub(crate) fn submit_uplink(
        &self,
        router_id: &RouterId,
        session_id: u64,
        frame: UplinkFrame,
    ) -> Result<SubmitOutcome> {
        if !self.routers.is_current(router_id, session_id) {
            tracing::debug!(router = %router_id, session_id = session_id, "Uplink on ended session rejected");
            return Err(Error::NotFound(router_id.to_string()));
        }
        if !frame.is_well_formed() {
            tracing::debug!(router = %router_id, dev_addr = %frame.dev_addr, "Malformed uplink rejected");
            return Err(Error::InvalidArgument(format!(
                "malformed uplink from device {}",
                frame.dev_addr
            )));
        }
        if frame.router_id() != router_id {
            return Err(Error::InvalidArgument(format!(
                "uplink reported by {} on session of {}",
                frame.router_id(),
                router_id
            )));
        }

        self.metrics.uplink_received();
        self.downlinks.record_uplink(&frame);
        Ok(self.dedup.submit(frame))
    }

    pub(crate) async fn publish_downlink(
        &self,
        handler_id: &HandlerId,
        frame: DownlinkFrame,
    ) -> Result<DownlinkReport> {
        if !frame.is_well_formed() {
            return Err(Error::InvalidArgument(format!(
                "malformed downlink for device {}",
                frame.dev_addr
            )));
        }

        if self.config.verify_downlink_owner {
            let owner = self.directory.resolve_handler(frame.dev_addr).await?;
            if &owner != handler_id {
                tracing::warn!(
                    handler = %handler_id,
                    owner = %owner,
                    dev_addr = %frame.dev_addr,
                    "Downlink for device owned by another handler rejected"
                );
                return Err(Error::PermissionDenied(format!(
                    "{} does not own device {}",
                    handler_id, frame.dev_addr
                )));
            }
        }

        self.downlinks.route(frame).await
    }

    /// Forget the router's affinity, unless a newer session has taken its id
    pub(crate) fn release_router(&self, router_id: &RouterId, session_id: u64) {
        if self.routers.is_current(router_id, session_id) {
            self.forget_router(router_id);
        }
    }

    fn forget_router(&self, router_id: &RouterId) {
        self.downlinks.affinity().forget_router(router_id);
    }
}

fn require_router(identity: &Identity, operation: &str) -> Result<RouterId> {
    identity.router_id().ok_or_else(|| {
        Error::PermissionDenied(format!("{} may not {} as a router", identity, operation))
    })
}

fn require_handler(identity: &Identity, operation: &str) -> Result<HandlerId> {
    identity.handler_id().ok_or_else(|| {
        Error::PermissionDenied(format!("{} may not {} as a handler", identity, operation))
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::activation::ActivationError;
    use crate::directory::StaticDirectory;
    use crate::message::{DevAddr, RxMetadata};
    use crate::error::StatusCode;
    use crate::session::StaticTokenValidator;

    struct NoActivator;

    impl HandlerActivator for NoActivator {
        async fn activate(
            &self,
            _handler: &HandlerId,
            _request: ActivationRequest,
        ) -> std::result::Result<ActivationResponse, ActivationError> {
            Err(ActivationError::Rejected("joins disabled".into()))
        }
    }

    fn broker() -> Arc<Broker<StaticDirectory, NoActivator>> {
        let directory = StaticDirectory::new().with_device(DevAddr(1), "handler-h");
        let validator = StaticTokenValidator::new()
            .with_token("r-token", Identity::router("router-a"))
            .with_token("h-token", Identity::handler("handler-h"));

        Arc::new(Broker::new(BrokerConfig::default(), directory, NoActivator).with_validator(validator))
    }

    fn uplink(router: &str) -> UplinkFrame {
        UplinkFrame::new(
            DevAddr(1),
            1,
            Bytes::from_static(&[0x40, 0x01]),
            RxMetadata::new(RouterId::new(router), -70.0, 3.0),
        )
    }

    #[test]
    fn test_authenticate() {
        let broker = broker();

        let identity = broker
            .authenticate(&ConnectionContext::new().token("r-token"))
            .unwrap();
        assert_eq!(identity, Identity::router("router-a"));

        let err = broker
            .authenticate(&ConnectionContext::new().token("nope"))
            .unwrap_err();
        assert_eq!(err, Error::Unauthenticated(AuthError::InvalidToken));
    }

    #[test]
    fn test_authenticate_without_validator() {
        let broker = Broker::new(BrokerConfig::default(), StaticDirectory::new(), NoActivator);

        let err = broker.authenticate(&ConnectionContext::new()).unwrap_err();
        assert_eq!(err, Error::Unauthenticated(AuthError::NoValidator));
    }

    #[tokio::test]
    async fn test_role_checks() {
        let broker = broker();

        assert!(matches!(
            broker.associate(&Identity::handler("handler-h")),
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            broker.subscribe(&Identity::router("router-a")),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_associate_is_exclusive_until_dropped() {
        let broker = broker();
        let identity = Identity::router("router-a");

        let session = broker.associate(&identity).unwrap();
        assert!(matches!(
            broker.associate(&identity),
            Err(Error::AlreadyActive(_))
        ));
        assert_eq!(broker.stats().active_routers, 1);

        drop(session);
        assert_eq!(broker.stats().active_routers, 0);
        assert!(broker.associate(&identity).is_ok());
    }

    #[tokio::test]
    async fn test_split_halves_share_the_lease() {
        let broker = broker();
        let session = broker.associate(&Identity::router("router-a")).unwrap();
        let (sink, source) = session.split();

        drop(source);
        assert!(broker.routers().is_active(&RouterId::new("router-a")));

        drop(sink);
        assert!(!broker.routers().is_active(&RouterId::new("router-a")));
    }

    #[tokio::test]
    async fn test_uplink_from_other_router_rejected() {
        let broker = broker();
        let session = broker.associate(&Identity::router("router-a")).unwrap();

        let err = session.submit_uplink(uplink("router-b")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // The session survives a rejected frame
        assert!(session.submit_uplink(uplink("router-a")).is_ok());
        assert_eq!(broker.stats().uplinks_received, 1);
    }

    #[tokio::test]
    async fn test_dropping_router_forgets_affinity() {
        let broker = broker();
        let session = broker.associate(&Identity::router("router-a")).unwrap();

        session.submit_uplink(uplink("router-a")).unwrap();
        assert_eq!(broker.affinity().routers(DevAddr(1)), vec![RouterId::new("router-a")]);

        drop(session);
        assert!(broker.affinity().routers(DevAddr(1)).is_empty());
    }

    #[tokio::test]
    async fn test_publish_requires_ownership() {
        let broker = broker();
        let publisher = broker.publish(&Identity::handler("handler-other")).unwrap();

        let err = publisher
            .publish(DownlinkFrame::new(DevAddr(1), Bytes::from_static(&[0x60])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_disconnect_router_closes_queue() {
        let broker = broker();
        let mut session = broker.associate(&Identity::router("router-a")).unwrap();

        assert!(broker.disconnect_router(&RouterId::new("router-a")));
        assert_eq!(session.recv_downlink().await, None);
    }

    #[tokio::test]
    async fn test_disconnected_session_rejects_uplinks() {
        let broker = broker();
        let session = broker.associate(&Identity::router("router-a")).unwrap();
        broker.disconnect_router(&RouterId::new("router-a"));

        let err = session.submit_uplink(uplink("router-a")).unwrap_err();
        assert_eq!(err, Error::NotFound("router-a".into()));
        assert_eq!(err.status_code(), StatusCode::NotFound);

        assert!(broker.affinity().is_empty());
        assert_eq!(broker.stats().uplinks_received, 0);
        assert_eq!(broker.dedup.pending(), 0);
    }

    #[tokio::test]
    async fn test_stale_session_drop_keeps_successor_affinity() {
        let broker = broker();
        let identity = Identity::router("router-a");
        let old = broker.associate(&identity).unwrap();
        broker.disconnect_router(&RouterId::new("router-a"));

        let successor = broker.associate(&identity).unwrap();
        successor.submit_uplink(uplink("router-a")).unwrap();
        drop(old);

        assert!(broker.routers().is_active(&RouterId::new("router-a")));
        assert_eq!(broker.affinity().routers(DevAddr(1)), vec![RouterId::new("router-a")]);

        drop(successor);
        assert!(broker.affinity().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_purges_affinity() {
        let directory = StaticDirectory::new().with_device(DevAddr(1), "handler-h");
        let config = BrokerConfig::default()
            .affinity_freshness(Duration::from_secs(10))
            .cleanup_interval(Duration::from_secs(5));
        let broker = Arc::new(Broker::new(config, directory, NoActivator));
        let session = broker.associate(&Identity::router("router-a")).unwrap();
        session.submit_uplink(uplink("router-a")).unwrap();

        let handle = broker.spawn_cleanup_task();
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert!(broker.affinity().is_empty());
        handle.abort();
    }
}
