//! In-process broker walk-through
//!
//! Three routers hear the same uplink, one handler receives it once, answers
//! with a downlink, and two routers report the same join request.
//!
//! Run with:
//! ```sh
//! RUST_LOG=lora_broker=debug cargo run --example loopback
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lora_broker::{
    ActivationError, ActivationRequest, ActivationResponse, AppEui, Broker, BrokerConfig,
    ConnectionContext, DevAddr, DevEui, DevNonce, DownlinkFrame, HandlerActivator, HandlerId,
    Identity, RouterId, RxMetadata, StaticDirectory, StaticTokenValidator, UplinkFrame,
};

const DEVICE: DevAddr = DevAddr(0x2601_1F2A);
const APP: AppEui = AppEui(0x70B3_D57E_D000_0001);

/// Accepts every join and hands out addresses from a fixed range
struct DemoActivator;

impl HandlerActivator for DemoActivator {
    async fn activate(
        &self,
        handler: &HandlerId,
        request: ActivationRequest,
    ) -> Result<ActivationResponse, ActivationError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        println!("{} accepts join of {}", handler, request.dev_eui);

        let addr = DevAddr(0x2601_0000 | u32::from(request.dev_nonce.0));
        Ok(ActivationResponse::new(
            addr,
            Bytes::from_static(&[0x20, 0x01, 0x02, 0x03]),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lora_broker=info".parse()?),
        )
        .init();

    let directory = StaticDirectory::new()
        .with_device(DEVICE, "handler-demo")
        .with_application(APP, "handler-demo");

    let mut validator =
        StaticTokenValidator::new().with_token("handler-token", Identity::handler("handler-demo"));
    for name in ["gw-north", "gw-east", "gw-south"] {
        validator = validator.with_token(format!("{}-token", name), Identity::router(name));
    }

    let config = BrokerConfig::default().dedup_window(Duration::from_millis(100));
    let broker = Arc::new(Broker::new(config, directory, DemoActivator).with_validator(validator));

    // Handler side
    let handler = broker.authenticate(&ConnectionContext::new().token("handler-token"))?;
    let mut subscription = broker.subscribe(&handler)?;
    let publisher = broker.publish(&handler)?;

    // Router side
    let mut routers = Vec::new();
    for name in ["gw-north", "gw-east", "gw-south"] {
        let ctx = ConnectionContext::new().token(format!("{}-token", name));
        let identity = broker.authenticate(&ctx)?;
        routers.push((identity.clone(), broker.associate(&identity)?));
    }

    let payload = Bytes::from_static(&[0x40, 0x2A, 0x1F, 0x01, 0x26, 0x00, 0x07, 0x00, 0xAB]);
    for ((_, session), rssi) in routers.iter().zip([-97.0, -71.5, -110.0]) {
        let frame = UplinkFrame::new(
            DEVICE,
            7,
            payload.clone(),
            RxMetadata::new(session.router_id().clone(), rssi, 6.5),
        );
        let outcome = session.submit_uplink(frame)?;
        println!("{} submitted uplink: {:?}", session.router_id(), outcome);
    }

    let delivery = subscription.recv().await.ok_or("subscription closed")?;
    println!(
        "handler got fcnt {} via {} (heard by {} routers)",
        delivery.uplink.fcnt,
        delivery.uplink.router_id(),
        delivery.reported_by.len()
    );

    let report = publisher
        .publish(DownlinkFrame::new(
            DEVICE,
            Bytes::from_static(&[0x60, 0x2A, 0x1F, 0x01, 0x26]),
        ))
        .await?;
    println!("downlink routed to {:?}", report.delivered);

    for (_, session) in routers.iter_mut() {
        if let Ok(Some(frame)) =
            tokio::time::timeout(Duration::from_millis(10), session.recv_downlink()).await
        {
            println!("{} transmits {} bytes", session.router_id(), frame.payload.len());
        }
    }

    // Two routers report the same join request
    let mut joins = Vec::new();
    for (identity, _) in routers.iter().take(2) {
        let broker = Arc::clone(&broker);
        let identity = identity.clone();
        let router_id = RouterId::new(identity.id.clone());
        joins.push(tokio::spawn(async move {
            let request = ActivationRequest::new(
                APP,
                DevEui(0x0004_A30B_001C_0530),
                DevNonce(0x1F2A),
                Bytes::from_static(&[0x00, 0x01, 0x02, 0x03]),
                RxMetadata::new(router_id, -90.0, 4.0),
            );
            broker.activate(&identity, request).await
        }));
    }
    for join in joins {
        let response = join.await??;
        println!("join accepted, device address {}", response.dev_addr);
    }

    println!("{:#?}", broker.stats());
    Ok(())
}
