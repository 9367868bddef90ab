//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use lora_broker::{
    ActivationError, ActivationRequest, ActivationResponse, AppEui, Broker, BrokerConfig, DevAddr,
    DevEui, DevNonce, DownlinkFrame, HandlerActivator, HandlerId, RouterId, RxMetadata,
    StaticDirectory, UplinkFrame,
};
use parking_lot::Mutex;

pub const DEVICE: DevAddr = DevAddr(0x2601_0042);
pub const OTHER_DEVICE: DevAddr = DevAddr(0x2601_0043);
pub const APP: AppEui = AppEui(1);
pub const HANDLER: &str = "handler-1";

static TRACING: Once = Once::new();

/// Install a test subscriber once; honors `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Handler activator with scripted delays, counting its queries
///
/// Clones share the script and the call counter.
#[derive(Clone)]
pub struct ScriptedActivator {
    calls: Arc<AtomicUsize>,
    delays: Arc<Mutex<VecDeque<Duration>>>,
}

impl ScriptedActivator {
    /// Answer every query after `delay`
    pub fn new(delay: Duration) -> Self {
        Self::scripted(vec![delay])
    }

    /// Answer the n-th query after `delays[n]`; the last delay repeats
    pub fn scripted(delays: Vec<Duration>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delays: Arc::new(Mutex::new(delays.into())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_delay(&self) -> Duration {
        let mut delays = self.delays.lock();
        if delays.len() > 1 {
            delays.pop_front().unwrap_or_default()
        } else {
            delays.front().copied().unwrap_or_default()
        }
    }
}

impl HandlerActivator for ScriptedActivator {
    async fn activate(
        &self,
        _handler: &HandlerId,
        request: ActivationRequest,
    ) -> Result<ActivationResponse, ActivationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as u32;
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;

        Ok(ActivationResponse::new(
            DevAddr(0x2600_1000 + n),
            Bytes::from(vec![0x20, request.dev_nonce.0 as u8]),
        ))
    }
}

pub type TestBroker = Broker<StaticDirectory, ScriptedActivator>;

/// Broker with `DEVICE`, `OTHER_DEVICE` and `APP` owned by `HANDLER`
pub fn broker(config: BrokerConfig) -> (Arc<TestBroker>, ScriptedActivator) {
    broker_with_activator(config, ScriptedActivator::new(Duration::from_millis(20)))
}

pub fn broker_with_activator(
    config: BrokerConfig,
    activator: ScriptedActivator,
) -> (Arc<TestBroker>, ScriptedActivator) {
    init_tracing();

    let directory = StaticDirectory::new()
        .with_device(DEVICE, HANDLER)
        .with_device(OTHER_DEVICE, HANDLER)
        .with_application(APP, HANDLER);
    let broker = Broker::new(config, directory, activator.clone());

    (Arc::new(broker), activator)
}

pub fn reception(dev_addr: DevAddr, router: &str, rssi: f32) -> UplinkFrame {
    UplinkFrame::new(
        dev_addr,
        17,
        Bytes::from_static(&[0x40, 0x42, 0x00, 0x01, 0x26, 0x80, 0x11, 0x00, 0x01, 0x5C]),
        RxMetadata::new(RouterId::new(router), rssi, 4.0),
    )
}

pub fn downlink(dev_addr: DevAddr, tag: u8) -> DownlinkFrame {
    DownlinkFrame::new(dev_addr, Bytes::from(vec![0x60, tag]))
}

pub fn join_request(router: &str) -> ActivationRequest {
    ActivationRequest::new(
        APP,
        DevEui(42),
        DevNonce(7),
        Bytes::from_static(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x07]),
        RxMetadata::new(RouterId::new(router), -95.0, 2.0),
    )
}
