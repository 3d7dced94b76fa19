//! Integration tests: several relay sessions sharing one bus.
//!
//! These tests drive the relay only through the crate's public API, the way
//! `busrelay-server` does: one shared [`MemoryBus`], one [`Relay`], and one
//! spawned session per mock client.  They verify fan-out between sessions,
//! isolation of a failed session from the others, and that no subscription
//! outlives its session.

use std::sync::Arc;
use std::time::Duration;

use busrelay_core::infrastructure::{mock_connection, MockClient};
use busrelay_core::{
    BusClient, EndReason, Frame, MemoryBus, Relay, SessionReport, SessionState, Topic,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn topic() -> Topic {
    Topic::new("websocketChannel").unwrap()
}

/// Starts `n` sessions and waits until all of them are subscribed.
async fn start_sessions(
    bus: &Arc<MemoryBus>,
    relay: &Relay,
    n: usize,
) -> Vec<(MockClient, JoinHandle<SessionReport>)> {
    let mut sessions = Vec::with_capacity(n);
    for _ in 0..n {
        let (conn, client) = mock_connection();
        let relay = relay.clone();
        sessions.push((client, tokio::spawn(async move { relay.run(conn).await })));
    }
    wait_for_subscribers(bus, n).await;
    sessions
}

async fn wait_for_subscribers(bus: &MemoryBus, n: usize) {
    timeout(WAIT, async {
        while bus.subscriber_count(&topic()).await != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

async fn next_frame(client: &mut MockClient) -> Frame {
    timeout(WAIT, client.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed while waiting for a frame")
}

/// Client A sends "hello"; session B must write it to B's connection.
#[tokio::test]
async fn test_message_from_one_client_reaches_another() {
    // Arrange
    let bus = Arc::new(MemoryBus::default());
    let relay = Relay::new(bus.clone(), topic());
    let mut sessions = start_sessions(&bus, &relay, 2).await;

    // Act
    sessions[0].0.send_text("hello");

    // Assert: B receives it, and so does A (the bus echoes to publishers)
    assert_eq!(next_frame(&mut sessions[1].0).await, Frame::text("hello"));
    assert_eq!(next_frame(&mut sessions[0].0).await, Frame::text("hello"));
}

#[tokio::test]
async fn test_every_message_fans_out_to_every_session_exactly_once() {
    // Arrange: five sessions, each sends one message
    let bus = Arc::new(MemoryBus::default());
    let relay = Relay::new(bus.clone(), topic());
    let mut sessions = start_sessions(&bus, &relay, 5).await;

    // Act
    for (i, (client, _)) in sessions.iter().enumerate() {
        client.send_text(&format!("from-{i}"));
    }

    // Assert: each session sees all five, once each
    for (client, _) in sessions.iter_mut() {
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(next_frame(client).await);
        }
        seen.sort_by(|a, b| a.payload().cmp(b.payload()));
        let expected: Vec<Frame> = (0..5).map(|i| Frame::text(format!("from-{i}"))).collect();
        assert_eq!(seen, expected);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.try_recv(), None, "no duplicates");
    }
}

#[tokio::test]
async fn test_failed_session_does_not_affect_others() {
    // Arrange
    let bus = Arc::new(MemoryBus::default());
    let relay = Relay::new(bus.clone(), topic());
    let mut sessions = start_sessions(&bus, &relay, 3).await;
    let (mut failing, failing_handle) = sessions.remove(0);

    // Act: one client drops
    failing.disconnect();
    let report = timeout(WAIT, failing_handle).await.unwrap().unwrap();

    // Assert: its session is gone, the others still relay
    assert_eq!(report.end, EndReason::ClientClosed);
    assert_eq!(report.state, SessionState::Closed);
    wait_for_subscribers(&bus, 2).await;

    sessions[0].0.send_text("still here");
    assert_eq!(next_frame(&mut sessions[1].0).await, Frame::text("still here"));
}

#[tokio::test]
async fn test_no_subscription_outlives_its_session() {
    let bus = Arc::new(MemoryBus::default());
    let relay = Relay::new(bus.clone(), topic());
    let sessions = start_sessions(&bus, &relay, 4).await;

    for (mut client, handle) in sessions {
        client.disconnect();
        let report = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(client.close_count(), 1);
        assert_eq!(report.state, SessionState::Closed);
    }

    assert_eq!(bus.subscriber_count(&topic()).await, 0);
}

#[tokio::test]
async fn test_broker_loss_ends_all_sessions() {
    let bus = Arc::new(MemoryBus::default());
    let relay = Relay::new(bus.clone(), topic());
    let sessions = start_sessions(&bus, &relay, 3).await;

    bus.disconnect_all().await;

    for (client, handle) in sessions {
        let report = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(report.end, EndReason::SubscriptionClosed);
        assert_eq!(client.close_count(), 1);
    }

    // The bus itself is still usable for new sessions.
    let _again = start_sessions(&bus, &relay, 1).await;
    bus.publish(&topic(), b"after reconnect").await.unwrap();
}
