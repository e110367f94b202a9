use super::*;
use crate::domain::types::{Location, UserId};
use tempfile::TempDir;

fn test_config(dir: &TempDir, ttl_hours: u64) -> Config {
    let alert_file = dir.path().join("alerts.jsonl");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "[presence]\nsession_ttl_hours = {ttl_hours}\n\n[stores]\nalert_file = \"{}\"\n",
            alert_file.display()
        ),
    )
    .unwrap();
    Config::from_file(&path).unwrap()
}

fn test_hub(dir: &TempDir, ttl_hours: u64) -> (PresenceHub, Arc<BroadcastDispatcher>) {
    let config = test_config(dir, ttl_hours);
    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(PresenceRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(metrics.clone()));
    let hub = PresenceHub::new(config, registry, dispatcher.clone(), metrics);
    (hub, dispatcher)
}

fn uid(s: &str) -> UserId {
    UserId(s.to_string())
}

async fn connect(
    hub: &mut PresenceHub,
    conn: u64,
) -> mpsc::Receiver<OutboundMessage> {
    let (tx, rx) = mpsc::channel(16);
    hub.process_event(HubEvent::Connected { conn: ConnId(conn), outbound: tx }).await;
    rx
}

async fn announce(hub: &mut PresenceHub, conn: u64, user: &str, lat: f64, lon: f64) {
    hub.process_event(HubEvent::Message {
        conn: ConnId(conn),
        message: InboundMessage::Announce {
            user_id: uid(user),
            location: Location::new(lat, lon),
            route: None,
        },
    })
    .await;
}

#[tokio::test]
async fn test_announce_broadcasts_to_other_sessions() {
    let dir = TempDir::new().unwrap();
    let (mut hub, _) = test_hub(&dir, 12);
    let mut rx1 = connect(&mut hub, 1).await;
    let mut rx2 = connect(&mut hub, 2).await;

    announce(&mut hub, 1, "u1", 64.14, -21.94).await;

    assert_eq!(hub.active_sessions(), 1);
    assert!(rx1.try_recv().is_err());
    match rx2.try_recv().unwrap() {
        OutboundMessage::CompanionLocationUpdate { user_id, .. } => {
            assert_eq!(user_id.as_str(), "u1");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn test_location_update_without_session_is_ignored() {
    let dir = TempDir::new().unwrap();
    let (mut hub, _) = test_hub(&dir, 12);
    let mut rx1 = connect(&mut hub, 1).await;

    hub.process_event(HubEvent::Message {
        conn: ConnId(2),
        message: InboundMessage::LocationUpdate {
            user_id: uid("ghost"),
            location: Location::new(0.0, 0.0),
        },
    })
    .await;

    assert_eq!(hub.active_sessions(), 0);
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn test_find_companions_replies_to_requester_only() {
    let dir = TempDir::new().unwrap();
    let (mut hub, _) = test_hub(&dir, 12);
    let mut rx1 = connect(&mut hub, 1).await;
    let mut rx2 = connect(&mut hub, 2).await;

    announce(&mut hub, 1, "near", 0.0, 0.001).await;
    // Drain the announce broadcast
    let _ = rx2.try_recv();

    hub.process_event(HubEvent::Message {
        conn: ConnId(2),
        message: InboundMessage::FindCompanions {
            user_id: uid("me"),
            location: Location::new(0.0, 0.0),
            max_distance_km: 1.0,
        },
    })
    .await;

    match rx2.try_recv().unwrap() {
        OutboundMessage::CompanionsFound { requester_user_id, count, companions } => {
            assert_eq!(requester_user_id.as_str(), "me");
            assert_eq!(count, 1);
            assert_eq!(companions[0].user_id.as_str(), "near");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn test_sos_persists_and_reaches_every_connection() {
    let dir = TempDir::new().unwrap();
    let (mut hub, _) = test_hub(&dir, 12);
    let mut rx1 = connect(&mut hub, 1).await;
    let mut rx2 = connect(&mut hub, 2).await;

    hub.process_event(HubEvent::Message {
        conn: ConnId(1),
        message: InboundMessage::Sos {
            user_id: uid("u1"),
            location: Location::new(64.14, -21.94),
            route: None,
            message: "Help".to_string(),
        },
    })
    .await;

    // Sender included in the fan-out
    for rx in [&mut rx1, &mut rx2] {
        match rx.recv().await.unwrap() {
            OutboundMessage::EmergencyAlert { alert } => {
                assert_eq!(alert.user_id.as_str(), "u1");
                assert_eq!(alert.message, "Help");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    let content = std::fs::read_to_string(dir.path().join("alerts.jsonl")).unwrap();
    assert_eq!(content.lines().count(), 1);
}

#[tokio::test]
async fn test_disconnect_announces_offline() {
    let dir = TempDir::new().unwrap();
    let (mut hub, dispatcher) = test_hub(&dir, 12);
    let _rx1 = connect(&mut hub, 1).await;
    let mut rx2 = connect(&mut hub, 2).await;

    announce(&mut hub, 1, "u1", 0.0, 0.0).await;
    let _ = rx2.try_recv();

    hub.process_event(HubEvent::Disconnected { conn: ConnId(1) }).await;

    assert_eq!(hub.active_sessions(), 0);
    assert_eq!(dispatcher.connection_count(), 1);
    match rx2.try_recv().unwrap() {
        OutboundMessage::CompanionOffline { user_id } => {
            assert_eq!(user_id.as_str(), "u1");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn test_run_tolerates_zero_sweep_interval() {
    let dir = TempDir::new().unwrap();
    let alert_file = dir.path().join("alerts.jsonl");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "[presence]\nsweep_interval_secs = 0\n\n[stores]\nalert_file = \"{}\"\n",
            alert_file.display()
        ),
    )
    .unwrap();
    let config = Config::from_file(&path).unwrap();
    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(PresenceRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(metrics.clone()));
    let mut hub = PresenceHub::new(config, registry, dispatcher, metrics);

    let (tx, rx) = mpsc::channel(8);
    drop(tx);
    // A zero period must not panic the loop; run exits on channel close
    tokio::time::timeout(std::time::Duration::from_secs(1), hub.run(rx))
        .await
        .expect("hub loop should exit when the event channel closes");
}

#[tokio::test]
async fn test_sweep_expires_idle_sessions() {
    let dir = TempDir::new().unwrap();
    // Zero ttl: anything announced is already idle
    let (mut hub, dispatcher) = test_hub(&dir, 0);
    let mut rx1 = connect(&mut hub, 1).await;

    announce(&mut hub, 1, "u1", 0.0, 0.0).await;
    std::thread::sleep(std::time::Duration::from_millis(5));

    hub.sweep_inactive();

    assert_eq!(hub.active_sessions(), 0);
    assert_eq!(dispatcher.connection_count(), 0);
    // The swept connection is unregistered before the offline notice
    assert!(rx1.try_recv().is_err());
}
