mod common;

use common::{launch, seeded_gateway, test_config};
use filter_sync::bus::{MessageBus, SessionId};
use filter_sync::popup::{ControlPanelState, CoordinatorClient, HeartbeatMonitor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[tokio::test]
async fn test_heartbeat_keeps_ticking_through_failures() {
    let config = test_config();
    // No coordinator on this bus: every tick fails
    let bus = MessageBus::new(Duration::from_millis(50));
    let client = CoordinatorClient::new(bus, SessionId(1), Duration::from_millis(50));
    let view = Arc::new(RwLock::new(ControlPanelState::default()));

    let monitor = HeartbeatMonitor::start(client, view, &config.heartbeat);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let ticks = monitor.ticks();
    assert!(ticks.pings_failed >= 3, "only {} failed pings", ticks.pings_failed);
    assert!(ticks.stats_failed >= 2, "only {} failed stats", ticks.stats_failed);
    assert_eq!(ticks.pings_ok, 0);
    assert!(monitor.is_running());

    monitor.stop().await;
}

#[tokio::test]
async fn test_popup_heartbeat_stops_on_close() {
    let runtime = launch(test_config(), seeded_gateway(&[])).await;
    let coordinator = runtime.coordinator().clone();
    let session = SessionId(7);

    let popup = runtime.open_popup(session).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let ticks = popup.heartbeat_ticks();
    assert!(ticks.pings_ok >= 2);
    assert!(ticks.stats_ok >= 1);
    assert!(coordinator.sessions().contains(session).await);

    coordinator.record_blocked(9);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(popup.view().await.stats.total_blocked, 9);

    popup.close().await;
    assert!(!coordinator.sessions().contains(session).await);

    // Nothing re-registers the session once the popup is gone
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!coordinator.sessions().contains(session).await);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_dropping_monitor_cancels_tasks() {
    let runtime = launch(test_config(), seeded_gateway(&[])).await;
    let session = SessionId(8);
    let client = CoordinatorClient::new(runtime.bus().clone(), session, Duration::from_millis(200));
    let view = Arc::new(RwLock::new(ControlPanelState::default()));

    let monitor = HeartbeatMonitor::start(client, view, &runtime.config().heartbeat);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(runtime.coordinator().sessions().contains(session).await);
    drop(monitor);
    // Let any ping already in flight land first
    tokio::time::sleep(Duration::from_millis(50)).await;

    runtime.coordinator().popup_closed(session).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!runtime.coordinator().sessions().contains(session).await);

    runtime.shutdown().await;
}
