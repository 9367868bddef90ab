mod common;

use std::time::Duration;

use lora_broker::registry::RegistryError;
use lora_broker::session::ForwardEnd;
use lora_broker::{BrokerConfig, Error, Identity, RouterId, StatusCode};

use common::{broker, downlink, reception, DEVICE, HANDLER, OTHER_DEVICE};

#[tokio::test(start_paused = true)]
async fn downlink_reaches_routers_that_heard_the_device() {
    let (broker, _) = broker(BrokerConfig::default());
    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let mut near = broker.associate(&Identity::router("router-near")).unwrap();
    let mut far = broker.associate(&Identity::router("router-far")).unwrap();

    near.submit_uplink(reception(DEVICE, "router-near", -70.0)).unwrap();

    let report = publisher.publish(downlink(DEVICE, 1)).await.unwrap();
    assert_eq!(report.delivered, vec![RouterId::new("router-near")]);
    assert!(report.failed.is_empty());

    let frame = near.recv_downlink().await.unwrap();
    assert_eq!(frame.payload.as_ref(), &[0x60, 1]);
    assert_eq!(frame.routers, vec![RouterId::new("router-near")]);

    let idle = tokio::time::timeout(Duration::from_millis(10), far.recv_downlink()).await;
    assert!(idle.is_err());
}

#[tokio::test(start_paused = true)]
async fn inactive_sole_router_yields_no_route_without_affecting_others() {
    let (broker, _) = broker(BrokerConfig::default());
    broker
        .directory()
        .set_routers(DEVICE, vec![RouterId::new("router-r")]);

    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let mut other = broker.associate(&Identity::router("router-s")).unwrap();
    other
        .submit_uplink(reception(OTHER_DEVICE, "router-s", -75.0))
        .unwrap();

    let err = publisher.publish(downlink(DEVICE, 1)).await.unwrap_err();
    assert_eq!(err, Error::NoRoute(DEVICE));
    assert_eq!(err.status_code(), StatusCode::Unavailable);

    let report = publisher.publish(downlink(OTHER_DEVICE, 2)).await.unwrap();
    assert_eq!(report.delivered, vec![RouterId::new("router-s")]);
    assert_eq!(other.recv_downlink().await.unwrap().payload.as_ref(), &[0x60, 2]);

    let stats = broker.stats();
    assert_eq!(stats.downlinks_no_route, 1);
    assert_eq!(stats.downlinks_routed, 1);
}

#[tokio::test(start_paused = true)]
async fn directory_routers_used_when_nothing_learned() {
    let (broker, _) = broker(BrokerConfig::default());
    broker
        .directory()
        .set_routers(DEVICE, vec![RouterId::new("router-r")]);

    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let mut router = broker.associate(&Identity::router("router-r")).unwrap();

    publisher.publish(downlink(DEVICE, 9)).await.unwrap();
    assert_eq!(router.recv_downlink().await.unwrap().payload.as_ref(), &[0x60, 9]);
}

#[tokio::test(start_paused = true)]
async fn stale_affinity_is_not_used() {
    let config = BrokerConfig::default().affinity_freshness(Duration::from_secs(60));
    let (broker, _) = broker(config);
    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let router = broker.associate(&Identity::router("router-a")).unwrap();

    router
        .submit_uplink(reception(DEVICE, "router-a", -70.0))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;

    let err = publisher.publish(downlink(DEVICE, 1)).await.unwrap_err();
    assert_eq!(err, Error::NoRoute(DEVICE));
}

#[tokio::test(start_paused = true)]
async fn partial_failure_is_reported_per_target() {
    let (broker, _) = broker(BrokerConfig::default());
    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let a = broker.associate(&Identity::router("router-a")).unwrap();
    let b = broker.associate(&Identity::router("router-b")).unwrap();

    a.submit_uplink(reception(DEVICE, "router-a", -70.0)).unwrap();
    b.submit_uplink(reception(DEVICE, "router-b", -80.0)).unwrap();

    // router-b goes away without a clean teardown of its affinity
    broker.routers().deactivate(&RouterId::new("router-b"));

    let report = publisher.publish(downlink(DEVICE, 3)).await.unwrap();
    assert_eq!(report.delivered, vec![RouterId::new("router-a")]);
    assert_eq!(
        report.failed,
        vec![(
            RouterId::new("router-b"),
            RegistryError::NotFound("router-b".into())
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn full_queue_drops_oldest_and_reports_backpressure() {
    let config = BrokerConfig::default().queue_capacity(2);
    let (broker, _) = broker(config);
    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let mut router = broker.associate(&Identity::router("router-a")).unwrap();
    router
        .submit_uplink(reception(DEVICE, "router-a", -70.0))
        .unwrap();

    publisher.publish(downlink(DEVICE, 1)).await.unwrap();
    publisher.publish(downlink(DEVICE, 2)).await.unwrap();
    let report = publisher.publish(downlink(DEVICE, 3)).await.unwrap();
    assert_eq!(report.backpressured, vec![RouterId::new("router-a")]);

    assert_eq!(router.recv_downlink().await.unwrap().payload.as_ref(), &[0x60, 2]);
    assert_eq!(router.recv_downlink().await.unwrap().payload.as_ref(), &[0x60, 3]);
    assert_eq!(broker.stats().backpressure_drops, 1);
}

#[tokio::test(start_paused = true)]
async fn deactivation_ends_forwarder_and_rejects_enqueue() {
    let (broker, _) = broker(BrokerConfig::default());
    let router_id = RouterId::new("router-a");
    let session = broker.associate(&Identity::router("router-a")).unwrap();
    let (_sink, mut source) = session.split();

    let forwarder = tokio::spawn(async move {
        source
            .forward(std::future::pending::<()>(), |_frame| async {
                Ok::<(), std::io::Error>(())
            })
            .await
    });
    tokio::task::yield_now().await;

    assert!(broker.disconnect_router(&router_id));

    let end = tokio::time::timeout(Duration::from_secs(1), forwarder)
        .await
        .expect("forwarder should return promptly")
        .unwrap()
        .unwrap();
    assert_eq!(end, ForwardEnd::Closed);

    assert_eq!(
        broker.routers().enqueue(&router_id, downlink(DEVICE, 1)),
        Err(RegistryError::NotFound("router-a".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_downlink_rejected() {
    let (broker, _) = broker(BrokerConfig::default());
    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();

    let frame = lora_broker::DownlinkFrame::new(DEVICE, bytes::Bytes::new());
    let err = publisher.publish(frame).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
}

#[tokio::test(start_paused = true)]
async fn reconnected_router_keeps_routes_when_old_session_drops() {
    let (broker, _) = broker(BrokerConfig::default());
    let publisher = broker.publish(&Identity::handler(HANDLER)).unwrap();
    let old = broker.associate(&Identity::router("router-a")).unwrap();

    assert!(broker.disconnect_router(&RouterId::new("router-a")));
    let mut successor = broker.associate(&Identity::router("router-a")).unwrap();
    successor
        .submit_uplink(reception(DEVICE, "router-a", -70.0))
        .unwrap();

    // The transport tears down the old session only after the reconnect
    drop(old);

    let report = publisher.publish(downlink(DEVICE, 4)).await.unwrap();
    assert_eq!(report.delivered, vec![RouterId::new("router-a")]);
    assert_eq!(successor.recv_downlink().await.unwrap().payload.as_ref(), &[0x60, 4]);
}

#[tokio::test(start_paused = true)]
async fn disconnected_sink_cannot_inject_uplinks() {
    let (broker, _) = broker(BrokerConfig::default());
    let mut subscription = broker.subscribe(&Identity::handler(HANDLER)).unwrap();
    let session = broker.associate(&Identity::router("router-a")).unwrap();
    let (sink, _source) = session.split();

    broker.disconnect_router(&RouterId::new("router-a"));

    let err = sink
        .submit(reception(DEVICE, "router-a", -70.0))
        .unwrap_err();
    assert_eq!(err, Error::NotFound("router-a".into()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(subscription.try_recv().is_none());
    assert!(broker.affinity().routers(DEVICE).is_empty());
}
