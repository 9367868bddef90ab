//! Activation coordinator
//!
//! A device transmits one join request; every router in range reports it.
//! The coordinator keys attempts by (application, device, nonce), queries the
//! owning handler once per attempt, and hands the same outcome to every
//! router that asked. Outcomes are kept for a retention window so late
//! duplicates are answered from cache instead of re-querying the handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::directory::DeviceDirectory;
use crate::message::{ActivationKey, ActivationRequest, ActivationResponse, HandlerId, RouterId};
use crate::stats::BrokerMetrics;

use super::attempt::{ActivationError, ActivationOutcome, AttemptState};

/// Default time to wait for the handler's answer
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time a finished attempt answers duplicates from cache
pub const DEFAULT_ACTIVATION_RETENTION: Duration = Duration::from_secs(10);

/// Issues activation queries to handlers
pub trait HandlerActivator: Send + Sync + 'static {
    /// Ask `handler` to accept a join request
    fn activate(
        &self,
        handler: &HandlerId,
        request: ActivationRequest,
    ) -> impl Future<Output = Result<ActivationResponse, ActivationError>> + Send;
}

struct Attempt {
    attempt_id: u64,
    state: AttemptState,
    requesters: Vec<RouterId>,
    outcome: watch::Sender<Option<ActivationOutcome>>,
    started_at: Instant,
    finished_at: Option<Instant>,
}

enum Joined {
    /// Finished recently: answer from cache
    Replay(ActivationOutcome),
    /// In flight: wait for the shared outcome
    Wait(watch::Receiver<Option<ActivationOutcome>>),
    /// New attempt: caller must start it, then wait
    Lead {
        attempt_id: u64,
        rx: watch::Receiver<Option<ActivationOutcome>>,
    },
}

/// Deduplicates join requests and runs one handler query per attempt
pub struct ActivationCoordinator<D, A> {
    attempts: Mutex<HashMap<ActivationKey, Attempt>>,
    directory: Arc<D>,
    activator: Arc<A>,
    metrics: Arc<BrokerMetrics>,
    timeout: Duration,
    retention: Duration,
    next_attempt_id: AtomicU64,
}

impl<D, A> ActivationCoordinator<D, A>
where
    D: DeviceDirectory,
    A: HandlerActivator,
{
    pub fn new(
        directory: Arc<D>,
        activator: Arc<A>,
        metrics: Arc<BrokerMetrics>,
        timeout: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            directory,
            activator,
            metrics,
            timeout,
            retention,
            next_attempt_id: AtomicU64::new(1),
        }
    }

    /// Handle one router's join request
    ///
    /// Resolves once the attempt for the request's key has an outcome. All
    /// requesters of one attempt receive the same outcome.
    pub async fn activate(
        self: &Arc<Self>,
        requester: RouterId,
        request: ActivationRequest,
    ) -> ActivationOutcome {
        let key = request.key();

        let mut rx = match self.join(&key, &requester) {
            Joined::Replay(outcome) => return outcome,
            Joined::Wait(rx) => rx,
            Joined::Lead { attempt_id, rx } => {
                self.spawn_attempt(key, attempt_id, request);
                rx
            }
        };

        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(ActivationError::HandlerFailed(
                "activation attempt abandoned".into(),
            ))
        })
    }

    /// Current state of the attempt for `key`, if one is tracked
    pub fn state(&self, key: &ActivationKey) -> Option<AttemptState> {
        self.attempts.lock().get(key).map(|a| a.state)
    }

    /// Routers that asked for the attempt for `key`
    pub fn requesters(&self, key: &ActivationKey) -> Vec<RouterId> {
        self.attempts
            .lock()
            .get(key)
            .map(|a| a.requesters.clone())
            .unwrap_or_default()
    }

    /// Number of attempts still waiting for an outcome
    pub fn in_flight(&self) -> usize {
        self.attempts
            .lock()
            .values()
            .filter(|a| !a.state.is_terminal())
            .count()
    }

    /// Forget finished attempts older than the retention window
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let before = attempts.len();

        attempts.retain(|_, attempt| match attempt.finished_at {
            Some(finished_at) => now.duration_since(finished_at) < self.retention,
            None => true,
        });

        before - attempts.len()
    }

    fn join(&self, key: &ActivationKey, requester: &RouterId) -> Joined {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();

        if let Some(attempt) = attempts.get_mut(key) {
            match attempt.finished_at {
                None => {
                    attempt.requesters.push(requester.clone());
                    tracing::debug!(
                        key = %key,
                        router = %requester,
                        requesters = attempt.requesters.len(),
                        "Duplicate activation request joined in-flight attempt"
                    );
                    return Joined::Wait(attempt.outcome.subscribe());
                }
                Some(finished_at) if now.duration_since(finished_at) < self.retention => {
                    let cached = attempt.outcome.borrow().clone();
                    if let Some(outcome) = cached {
                        attempt.requesters.push(requester.clone());
                        self.metrics.activation_replayed();
                        tracing::debug!(
                            key = %key,
                            router = %requester,
                            state = ?attempt.state,
                            "Activation answered from cache"
                        );
                        return Joined::Replay(outcome);
                    }
                }
                // Retention elapsed: the key starts over
                Some(_) => {}
            }
        }

        let attempt_id = self.next_attempt_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        attempts.insert(
            *key,
            Attempt {
                attempt_id,
                state: AttemptState::Init,
                requesters: vec![requester.clone()],
                outcome: tx,
                started_at: now,
                finished_at: None,
            },
        );
        self.metrics.activation_started();

        tracing::info!(
            key = %key,
            router = %requester,
            attempt_id = attempt_id,
            "Activation attempt started"
        );

        Joined::Lead { attempt_id, rx }
    }

    fn spawn_attempt(
        self: &Arc<Self>,
        key: ActivationKey,
        attempt_id: u64,
        request: ActivationRequest,
    ) {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let query = this.run_attempt(&key, attempt_id, request);
            let outcome = match tokio::time::timeout(this.timeout, query).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ActivationError::Timeout),
            };
            this.finish(&key, attempt_id, outcome);
        });
    }

    async fn run_attempt(
        &self,
        key: &ActivationKey,
        attempt_id: u64,
        request: ActivationRequest,
    ) -> ActivationOutcome {
        let handler = self
            .directory
            .resolve_app_handler(key.app_eui)
            .await
            .map_err(ActivationError::Unroutable)?;

        self.set_state(key, attempt_id, AttemptState::AwaitingHandler);
        tracing::debug!(key = %key, handler = %handler, "Querying handler for activation");

        self.activator.activate(&handler, request).await
    }

    fn set_state(&self, key: &ActivationKey, attempt_id: u64, state: AttemptState) {
        if let Some(attempt) = self.attempts.lock().get_mut(key) {
            if attempt.attempt_id == attempt_id && !attempt.state.is_terminal() {
                attempt.state = state;
            }
        }
    }

    /// Record the outcome and release every waiting requester
    fn finish(&self, key: &ActivationKey, attempt_id: u64, outcome: ActivationOutcome) {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();

        let Some(attempt) = attempts.get_mut(key) else {
            return;
        };
        if attempt.attempt_id != attempt_id {
            return;
        }

        attempt.state = AttemptState::from_outcome(&outcome);
        attempt.finished_at = Some(now);
        let elapsed_ms = now.duration_since(attempt.started_at).as_millis() as u64;

        match &outcome {
            Ok(response) => {
                tracing::info!(
                    key = %key,
                    dev_addr = %response.dev_addr,
                    requesters = attempt.requesters.len(),
                    elapsed_ms = elapsed_ms,
                    "Activation completed"
                );
            }
            Err(ActivationError::Timeout) => {
                self.metrics.activation_timed_out();
                tracing::warn!(
                    key = %key,
                    requesters = attempt.requesters.len(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Activation timed out"
                );
            }
            Err(e) => {
                self.metrics.activation_failed();
                tracing::warn!(
                    key = %key,
                    requesters = attempt.requesters.len(),
                    error = %e,
                    "Activation failed"
                );
            }
        }

        attempt.outcome.send_replace(Some(outcome));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use bytes::Bytes;

    use super::*;
    use crate::directory::StaticDirectory;
    use crate::message::{AppEui, DevAddr, DevEui, DevNonce, RxMetadata};

    struct FakeActivator {
        calls: AtomicUsize,
        delay: Duration,
        reject: bool,
    }

    impl FakeActivator {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                reject: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HandlerActivator for FakeActivator {
        async fn activate(
            &self,
            _handler: &HandlerId,
            request: ActivationRequest,
        ) -> Result<ActivationResponse, ActivationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u32;
            tokio::time::sleep(self.delay).await;
            if self.reject {
                return Err(ActivationError::Rejected("bad nonce".into()));
            }
            Ok(ActivationResponse::new(
                DevAddr(0x2600_0000 + n),
                Bytes::from(vec![0x20, request.dev_nonce.0 as u8]),
            ))
        }
    }

    fn coordinator(
        activator: FakeActivator,
    ) -> (
        Arc<ActivationCoordinator<StaticDirectory, FakeActivator>>,
        Arc<FakeActivator>,
    ) {
        let directory = Arc::new(StaticDirectory::new().with_application(AppEui(1), "handler-h"));
        let activator = Arc::new(activator);
        let coordinator = ActivationCoordinator::new(
            directory,
            Arc::clone(&activator),
            Arc::new(BrokerMetrics::new()),
            Duration::from_secs(5),
            Duration::from_secs(10),
        );
        (Arc::new(coordinator), activator)
    }

    fn request(router: &str, app: u64) -> ActivationRequest {
        ActivationRequest::new(
            AppEui(app),
            DevEui(42),
            DevNonce(7),
            Bytes::from_static(&[0x00, 0x01, 0x02]),
            RxMetadata::new(RouterId::new(router), -80.0, 5.0),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_request_completes() {
        let (coordinator, activator) = coordinator(FakeActivator::new(Duration::from_millis(20)));

        let response = coordinator
            .activate(RouterId::new("a"), request("a", 1))
            .await
            .unwrap();

        assert_eq!(response.payload.as_ref(), &[0x20, 7]);
        assert_eq!(activator.calls(), 1);
        assert_eq!(
            coordinator.state(&request("a", 1).key()),
            Some(AttemptState::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_duplicates_share_one_query() {
        let (coordinator, activator) = coordinator(FakeActivator::new(Duration::from_millis(50)));

        let mut tasks = Vec::new();
        for router in ["a", "b", "c"] {
            let coordinator = Arc::clone(&coordinator);
            tasks.push(tokio::spawn(async move {
                coordinator
                    .activate(RouterId::new(router), request(router, 1))
                    .await
            }));
        }

        let mut responses = Vec::new();
        for task in tasks {
            responses.push(task.await.unwrap().unwrap());
        }

        assert_eq!(activator.calls(), 1);
        assert!(responses.iter().all(|r| r == &responses[0]));
        assert_eq!(coordinator.requesters(&request("a", 1).key()).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_within_retention() {
        let (coordinator, activator) = coordinator(FakeActivator::new(Duration::from_millis(10)));

        let first = coordinator.activate(RouterId::new("a"), request("a", 1)).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let replay = coordinator.activate(RouterId::new("b"), request("b", 1)).await;

        assert_eq!(first, replay);
        assert_eq!(activator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_attempt_after_retention() {
        let (coordinator, activator) = coordinator(FakeActivator::new(Duration::from_millis(10)));

        let first = coordinator.activate(RouterId::new("a"), request("a", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        let second = coordinator.activate(RouterId::new("a"), request("a", 1)).await.unwrap();

        assert_eq!(activator.calls(), 2);
        assert_ne!(first.dev_addr, second.dev_addr);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reaches_every_requester() {
        let (coordinator, activator) = coordinator(FakeActivator::new(Duration::from_secs(60)));

        let a = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.activate(RouterId::new("a"), request("a", 1)).await })
        };
        let b = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.activate(RouterId::new("b"), request("b", 1)).await })
        };

        assert_eq!(a.await.unwrap(), Err(ActivationError::Timeout));
        assert_eq!(b.await.unwrap(), Err(ActivationError::Timeout));
        assert_eq!(activator.calls(), 1);
        assert_eq!(
            coordinator.state(&request("a", 1).key()),
            Some(AttemptState::TimedOut)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_shared() {
        let mut fake = FakeActivator::new(Duration::from_millis(10));
        fake.reject = true;
        let (coordinator, _) = coordinator(fake);

        let outcome = coordinator.activate(RouterId::new("a"), request("a", 1)).await;
        assert_eq!(outcome, Err(ActivationError::Rejected("bad nonce".into())));
        assert_eq!(
            coordinator.state(&request("a", 1).key()),
            Some(AttemptState::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_application_fails_without_query() {
        let (coordinator, activator) = coordinator(FakeActivator::new(Duration::from_millis(10)));

        let outcome = coordinator.activate(RouterId::new("a"), request("a", 99)).await;

        assert!(matches!(outcome, Err(ActivationError::Unroutable(_))));
        assert_eq!(activator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let (coordinator, _) = coordinator(FakeActivator::new(Duration::from_millis(10)));

        coordinator.activate(RouterId::new("a"), request("a", 1)).await.unwrap();
        assert_eq!(coordinator.purge_expired(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(coordinator.purge_expired(), 1);
        assert_eq!(coordinator.state(&request("a", 1).key()), None);
    }
}
