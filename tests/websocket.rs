use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use mtrack::bridge::{BridgeConfig, Inbound};
use mtrack::shutdown::{self, ShutdownTrigger};
use mtrack::{Bridge, Error};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    bridge: Arc<Bridge>,
    addr: SocketAddr,
    trigger: ShutdownTrigger,
    accept: JoinHandle<Result<(), Error>>,
    broadcast: JoinHandle<()>,
}

async fn start(config: BridgeConfig) -> Server {
    let bridge = Arc::new(Bridge::new(BridgeConfig {
        port: 0,
        ..config
    }));
    let (trigger, shutdown) = shutdown::channel();

    let listener = bridge.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = tokio::spawn(bridge.clone().accept_loop(listener, shutdown.clone()));
    let broadcast = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.broadcast_loop(shutdown).await })
    };

    Server {
        bridge,
        addr,
        trigger,
        accept,
        broadcast,
    }
}

async fn connect(server: &Server, expected: usize) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    wait_for_consumers(&server.bridge, expected).await;

    client
}

async fn wait_for_consumers(bridge: &Bridge, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bridge.consumer_count().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_text(client: &mut Client) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn clients_receive_in_order_and_send_upstream() {
    let server = start(BridgeConfig::default()).await;

    let mut c1 = connect(&server, 1).await;
    let mut c2 = connect(&server, 2).await;

    server.bridge.publish_text("e1".into());
    server.bridge.publish_text("e2".into());

    for client in [&mut c1, &mut c2] {
        assert_eq!(next_text(client).await, "e1");
        assert_eq!(next_text(client).await, "e2");
    }

    c2.send(Message::Text("hi".into())).await.unwrap();
    let inbound = tokio::time::timeout(Duration::from_secs(5), server.bridge.receive())
        .await
        .unwrap();
    assert_eq!(
        inbound,
        Some(Inbound {
            consumer: 2,
            text: "hi".into()
        })
    );

    c2.close(None).await.unwrap();
    wait_for_consumers(&server.bridge, 1).await;

    server.trigger.trigger();
    let res = tokio::time::timeout(Duration::from_secs(5), server.accept)
        .await
        .unwrap()
        .unwrap();
    assert!(res.is_ok());
    server.broadcast.await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match c1.next().await {
                Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn stalled_client_is_disconnected() {
    let server = start(BridgeConfig {
        send_timeout_ms: 100,
        ..Default::default()
    })
    .await;

    let mut stalled = connect(&server, 1).await;

    // far more than the socket buffers hold while the client is not reading
    let big = "x".repeat(8 << 20);
    for _ in 0..4 {
        server.bridge.publish_text(big.clone());
    }
    wait_for_consumers(&server.bridge, 0).await;

    // whatever was buffered, the connection ends instead of hanging on a partial frame
    let ended = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match stalled.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());

    // a fresh client still gets served
    let mut fresh = connect(&server, 1).await;
    server.bridge.publish_text("after".into());
    // the tail of the backlog may still be in flight
    while next_text(&mut fresh).await != "after" {}

    server.trigger.trigger();
    server.accept.await.unwrap().unwrap();
    server.broadcast.await.unwrap();
}
