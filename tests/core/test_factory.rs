#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{closes, connects, healths, mock_config, report_fault, MockTransport};
use lease_pool::{ConnectionFactory, ConnectionId, EventBus, PoolError, PoolEvent};

#[tokio::test]
async fn test_create_assigns_unique_ids() {
    let factory: ConnectionFactory<MockTransport> =
        ConnectionFactory::new(&mock_config("factory_ids", 10), EventBus::new());

    let first = factory.create().await.expect("create failed");
    let second = factory.create().await.expect("create failed");

    assert_eq!(first.id(), ConnectionId(1));
    assert_eq!(second.id(), ConnectionId(2));
    assert!(first.is_alive());
    assert_eq!(connects("factory_ids"), 2);
}

#[tokio::test]
async fn test_create_installs_fault_handler() {
    let factory: ConnectionFactory<MockTransport> =
        ConnectionFactory::new(&mock_config("factory_watch", 10), EventBus::new());

    let conn = factory.create().await.expect("create failed");
    let watched = healths("factory_watch");
    assert_eq!(watched.len(), 1);
    assert_eq!(watched[0].id(), conn.id());

    report_fault("factory_watch", 0);
    assert!(!conn.is_alive());
    assert!(!watched[0].is_healthy());
    assert_eq!(closes("factory_watch"), 1);
}

#[tokio::test]
async fn test_create_reports_events() {
    let events = EventBus::new();
    let mut rx = events.subscribe();

    let ok: ConnectionFactory<MockTransport> =
        ConnectionFactory::new(&mock_config("factory_events", 10), events.clone());
    let conn = ok.create().await.expect("create failed");

    let refused: ConnectionFactory<MockTransport> = ConnectionFactory::new(
        &mock_config("factory_events_refused", 10).with_option("mock.refuse", "true"),
        events,
    );
    assert!(refused.create().await.is_err());

    assert_eq!(rx.try_recv().ok(), Some(PoolEvent::ConnectionCreated { id: conn.id() }));
    match rx.try_recv() {
        Ok(PoolEvent::ConnectionFailed { reason }) => assert!(reason.contains("refused")),
        other => panic!("expected failure event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_auth_failure_closes_half_open_transport() {
    let config = mock_config("factory_auth", 10)
        .with_option("mock.password", "s3cret")
        .with_password("nope");
    let factory: ConnectionFactory<MockTransport> = ConnectionFactory::new(&config, EventBus::new());

    match factory.create().await {
        Err(PoolError::Auth(message)) => assert!(message.contains("WRONGPASS")),
        other => panic!("expected auth error, got {:?}", other),
    }
    assert_eq!(connects("factory_auth"), 1);
    assert_eq!(closes("factory_auth"), 1);
}

#[tokio::test]
async fn test_matching_password_is_accepted() {
    let config = mock_config("factory_auth_ok", 10)
        .with_option("mock.password", "s3cret")
        .with_password("s3cret");
    let factory: ConnectionFactory<MockTransport> = ConnectionFactory::new(&config, EventBus::new());

    assert!(factory.create().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_times_out() {
    let config = mock_config("factory_timeout", 10)
        .with_option("mock.connect_delay_ms", "5000")
        .with_connect_timeout(Duration::from_millis(100));
    let factory: ConnectionFactory<MockTransport> = ConnectionFactory::new(&config, EventBus::new());

    match factory.create().await {
        Err(PoolError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(100)),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(connects("factory_timeout"), 0);
}
