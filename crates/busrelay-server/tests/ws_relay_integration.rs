//! End-to-end tests: real WebSocket clients against a running server.
//!
//! The server is started with [`serve`] on an ephemeral port and the
//! in-memory bus, so no Redis is needed.  Clients are plain
//! `tokio_tungstenite` connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use busrelay_core::{MemoryBus, Topic};
use busrelay_server::domain::{BusBackend, BusConfig, ServerConfig};
use busrelay_server::infrastructure::serve;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    bus: Arc<MemoryBus>,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

fn topic() -> Topic {
    Topic::new("websocketChannel").unwrap()
}

async fn start_server(read_timeout: Option<Duration>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        bind_addr: addr,
        endpoint_path: "/socket".to_string(),
        topic: topic(),
        read_timeout,
        shutdown_timeout: Duration::from_secs(1),
        bus: BusConfig {
            backend: BusBackend::Memory,
            ..BusConfig::default()
        },
    };
    let bus = Arc::new(MemoryBus::default());
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, config, bus.clone(), shutdown.clone()));
    TestServer {
        addr,
        bus,
        shutdown,
        handle,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _response) = connect_async(format!("ws://{addr}/socket")).await.unwrap();
    ws
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

async fn next_data(client: &mut Client) -> Message {
    timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => return msg,
                Some(Ok(_)) => continue,
                other => panic!("connection ended while waiting for data: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a message")
}

/// True once the server has closed `client` (close frame or end of stream).
async fn closed_by_server(client: &mut Client) -> bool {
    timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}

#[tokio::test]
async fn test_text_from_one_client_reaches_the_other() {
    // Arrange
    let server = start_server(None).await;
    let mut a = connect(server.addr).await;
    let mut b = connect(server.addr).await;
    wait_for_subscribers(&server.bus, 2).await;

    // Act
    a.send(Message::Text("hello".into())).await.unwrap();

    // Assert
    assert_eq!(next_data(&mut b).await, Message::Text("hello".into()));
    assert_eq!(next_data(&mut a).await, Message::Text("hello".into()));
}

#[tokio::test]
async fn test_binary_payload_passes_through_unchanged() {
    let server = start_server(None).await;
    let mut a = connect(server.addr).await;
    let mut b = connect(server.addr).await;
    wait_for_subscribers(&server.bus, 2).await;

    // Not valid UTF-8, so it must come back as a binary message.
    let payload = vec![0x00, 0x9f, 0x92, 0x96, 0xff];
    a.send(Message::Binary(payload.clone())).await.unwrap();

    assert_eq!(next_data(&mut b).await, Message::Binary(payload));
}

#[tokio::test]
async fn test_bus_message_reaches_every_client() {
    use busrelay_core::BusClient;

    let server = start_server(None).await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect(server.addr).await);
    }
    wait_for_subscribers(&server.bus, 3).await;

    server.bus.publish(&topic(), b"broadcast").await.unwrap();

    for client in clients.iter_mut() {
        assert_eq!(next_data(client).await, Message::Text("broadcast".into()));
    }
}

#[tokio::test]
async fn test_other_path_is_rejected_with_404() {
    let server = start_server(None).await;

    let result = connect_async(format!("ws://{}/elsewhere", server.addr)).await;

    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 404),
        Err(e) => panic!("expected an HTTP 404, got {e}"),
        Ok(_) => panic!("upgrade on the wrong path succeeded"),
    }
    assert_eq!(server.bus.subscriber_count(&topic()).await, 0);
}

#[tokio::test]
async fn test_client_close_releases_its_subscription() {
    let server = start_server(None).await;
    let mut a = connect(server.addr).await;
    let _b = connect(server.addr).await;
    wait_for_subscribers(&server.bus, 2).await;

    a.close(None).await.unwrap();

    wait_for_subscribers(&server.bus, 1).await;
}

#[tokio::test]
async fn test_idle_client_is_closed_after_read_timeout() {
    let server = start_server(Some(Duration::from_millis(200))).await;
    let mut idle = connect(server.addr).await;
    wait_for_subscribers(&server.bus, 1).await;

    assert!(closed_by_server(&mut idle).await);
    wait_for_subscribers(&server.bus, 0).await;
}

#[tokio::test]
async fn test_shutdown_closes_clients_and_stops_server() {
    // Arrange
    let server = start_server(None).await;
    let mut a = connect(server.addr).await;
    wait_for_subscribers(&server.bus, 1).await;

    // Act
    server.shutdown.cancel();

    // Assert
    assert!(closed_by_server(&mut a).await);
    let result = timeout(WAIT, server.handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(server.bus.subscriber_count(&topic()).await, 0);
    assert!(TcpStream::connect(server.addr).await.is_err());
}
