//! Redis implementation of the bus port.
//!
//! Publishing goes through one shared multiplexed connection; the `redis`
//! crate pipelines concurrent commands over it, so every session can publish
//! through a clone of the same handle.
//!
//! Subscriptions cannot share that connection (a connection in subscribe mode
//! accepts no other commands), so each session opens its own pub/sub
//! connection.  Dropping it releases the subscription on the broker.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, Msg, RedisConnectionInfo};
use tracing::{debug, info};

use busrelay_core::{BusClient, BusError, BusMessage, Subscription, Topic};

use crate::domain::config::BusConfig;

/// Builds the connection settings for `config`.
///
/// `redis_address` is `host:port`; IPv6 hosts may be bracketed
/// (`[::1]:6379`).  An empty password means no `AUTH`.
///
/// # Errors
///
/// Returns [`BusError::Unavailable`] if the address has no valid port.
pub fn connection_info(config: &BusConfig) -> Result<ConnectionInfo, BusError> {
    let invalid = || {
        BusError::Unavailable(format!("invalid redis address '{}'", config.redis_address))
    };

    let (host, port) = config.redis_address.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }

    let password = Some(config.redis_password.clone()).filter(|p| !p.is_empty());
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_string(), port),
        redis: RedisConnectionInfo {
            db: config.redis_db,
            password,
            ..RedisConnectionInfo::default()
        },
    })
}

/// Shared Redis client.
pub struct RedisBus {
    client: Client,
    publisher: MultiplexedConnection,
}

impl RedisBus {
    /// Connects to Redis and checks the connection with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] if the address is invalid, the server
    /// cannot be reached, or authentication fails.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let client = Client::open(connection_info(config)?)
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let mut publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut publisher)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        debug!("redis answered PING with {pong}");

        info!(
            "connected to redis at {} (db {})",
            config.redis_address, config.redis_db
        );
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl BusClient for RedisBus {
    async fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(topic.as_str(), payload)
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        debug!("published {} bytes to '{topic}' ({receivers} receivers)", payload.len());
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Box<dyn Subscription>, BusError> {
        let subscribe_error = |e: redis::RedisError| BusError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(subscribe_error)?;
        pubsub
            .subscribe(topic.as_str())
            .await
            .map_err(subscribe_error)?;

        Ok(Box::new(RedisSubscription {
            topic: topic.clone(),
            messages: Some(pubsub.into_on_message().boxed()),
        }))
    }
}

/// One session's Redis subscription.
pub struct RedisSubscription {
    topic: Topic,
    /// `None` once closed.  Dropping the stream drops the pub/sub connection.
    messages: Option<BoxStream<'static, Msg>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>> {
        let messages = self.messages.as_mut()?;
        match messages.next().await {
            Some(msg) => Some(Ok(BusMessage {
                topic: self.topic.clone(),
                payload: msg.get_payload_bytes().to_vec(),
            })),
            None => {
                // The connection to Redis is gone.
                self.messages = None;
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), BusError> {
        if self.messages.take().is_some() {
            debug!("released redis subscription to '{}'", self.topic);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
