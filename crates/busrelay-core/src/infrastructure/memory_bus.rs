//! In-process pub/sub bus for single-node deployments and tests.
//!
//! Each topic is a `tokio::sync::broadcast` channel created on first
//! subscription.  Every subscriber gets its own receiver, so a message
//! published once is delivered to every open subscription on that topic,
//! including one owned by the publishing session (the same echo behaviour as
//! Redis).
//!
//! # Slow subscribers
//!
//! A broadcast channel has a fixed capacity.  A subscriber that falls more
//! than `capacity` messages behind loses the oldest ones; the subscription
//! logs how many were skipped and carries on with the next available message.
//!
//! # Fault injection
//!
//! [`MemoryBus::set_available`] simulates a broker outage (new publishes and
//! subscriptions fail) and [`MemoryBus::disconnect_all`] simulates a lost
//! broker connection (every open subscription's stream ends).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::application::ports::{BusClient, BusError, BusMessage, Subscription};
use crate::domain::topic::Topic;

/// Default per-topic buffer, in messages.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Process-local publish/subscribe broker.
#[derive(Debug)]
pub struct MemoryBus {
    /// Topic → broadcast sender.
    topics: Mutex<HashMap<Topic, broadcast::Sender<BusMessage>>>,
    /// Buffer size for each topic's broadcast channel.
    capacity: usize,
    available: AtomicBool,
}

impl MemoryBus {
    /// Creates a bus whose topics buffer up to `capacity` messages per
    /// subscriber (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Number of open subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Ends every open subscription's message stream, as if the broker
    /// connection had dropped.  Later subscriptions work normally.
    pub async fn disconnect_all(&self) {
        let mut topics = self.topics.lock().await;
        debug!("memory bus: disconnecting {} topic(s)", topics.len());
        topics.clear();
    }

    /// Marks the broker as reachable or not.  While unavailable, `publish`
    /// and `subscribe` fail; already open subscriptions are unaffected.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    async fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<(), BusError> {
        if !self.is_available() {
            return Err(BusError::Unavailable("memory bus is offline".into()));
        }
        let topics = self.topics.lock().await;
        if let Some(tx) = topics.get(topic) {
            // `send` only fails when nobody is subscribed, which is not an error
            // for a fire-and-forget bus.
            let _ = tx.send(BusMessage {
                topic: topic.clone(),
                payload: payload.to_vec(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Box<dyn Subscription>, BusError> {
        if !self.is_available() {
            return Err(BusError::Subscribe {
                topic: topic.to_string(),
                reason: "memory bus is offline".into(),
            });
        }
        let mut topics = self.topics.lock().await;
        let rx = topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Ok(Box::new(MemorySubscription {
            topic: topic.clone(),
            rx: Some(rx),
        }))
    }
}

/// A subscription on a [`MemoryBus`] topic.
#[derive(Debug)]
pub struct MemorySubscription {
    topic: Topic,
    /// `None` once closed; dropping the receiver unsubscribes.
    rx: Option<broadcast::Receiver<BusMessage>>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(message) => return Some(Ok(message)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "memory bus: subscriber on '{}' lagged, skipped {skipped} message(s)",
                        self.topic
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), BusError> {
        self.rx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn topic() -> Topic {
        Topic::new("websocketChannel").unwrap()
    }

    #[tokio::test]
    async fn test_published_message_reaches_every_subscriber() {
        // Arrange
        let bus = MemoryBus::default();
        let mut a = bus.subscribe(&topic()).await.unwrap();
        let mut b = bus.subscribe(&topic()).await.unwrap();

        // Act
        assert_ok!(bus.publish(&topic(), b"hello").await);

        // Assert
        let got_a = a.next_message().await.unwrap().unwrap();
        let got_b = b.next_message().await.unwrap().unwrap();
        assert_eq!(got_a.payload, b"hello");
        assert_eq!(got_b.payload, b"hello");
        assert_eq!(got_a.topic, topic());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let bus = MemoryBus::default();
        assert_ok!(bus.publish(&topic(), b"nobody listening").await);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MemoryBus::default();
        let other = Topic::new("other").unwrap();
        let mut sub = bus.subscribe(&other).await.unwrap();

        bus.publish(&topic(), b"not for you").await.unwrap();
        bus.publish(&other, b"for you").await.unwrap();

        let msg = sub.next_message().await.unwrap().unwrap();
        assert_eq!(msg.payload, b"for you");
    }

    #[tokio::test]
    async fn test_messages_arrive_in_publish_order() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe(&topic()).await.unwrap();

        for i in 0..10u8 {
            bus.publish(&topic(), &[i]).await.unwrap();
        }

        for i in 0..10u8 {
            assert_eq!(sub.next_message().await.unwrap().unwrap().payload, vec![i]);
        }
    }

    #[tokio::test]
    async fn test_close_releases_subscription_and_is_idempotent() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe(&topic()).await.unwrap();
        assert_eq!(bus.subscriber_count(&topic()).await, 1);

        assert_ok!(sub.close().await);
        assert_ok!(sub.close().await);

        assert_eq!(bus.subscriber_count(&topic()).await, 0);
        assert!(sub.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_all_ends_open_streams() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe(&topic()).await.unwrap();

        bus.disconnect_all().await;

        assert!(sub.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_bus_rejects_publish_and_subscribe() {
        let bus = MemoryBus::default();
        bus.set_available(false);

        assert_err!(bus.publish(&topic(), b"x").await);
        assert!(matches!(
            bus.subscribe(&topic()).await,
            Err(BusError::Subscribe { .. })
        ));

        bus.set_available(true);
        assert_ok!(bus.subscribe(&topic()).await);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_to_newest_messages() {
        // Arrange: capacity 2, then publish 4 before reading
        let bus = MemoryBus::new(2);
        let mut sub = bus.subscribe(&topic()).await.unwrap();
        for i in 0..4u8 {
            bus.publish(&topic(), &[i]).await.unwrap();
        }

        // Act / Assert: the two oldest were dropped, the rest arrive in order
        assert_eq!(sub.next_message().await.unwrap().unwrap().payload, vec![2]);
        assert_eq!(sub.next_message().await.unwrap().unwrap().payload, vec![3]);
    }
}
