//! Default transport against a loopback WebSocket server

use discord_gateway::{GatewayError, Transport, WsTransport};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::accept_async;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_target(false).try_init();
    });
}

/// Minimal echo server: every text/binary frame comes straight back
struct EchoServer {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl EchoServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_accept = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                tokio::spawn(Self::handle_connection(stream));
                            }
                            Err(_) => break,
                        }
                    }
                    _ = shutdown_accept.notified() => break,
                }
            }
        });

        Self { addr, shutdown }
    }

    async fn handle_connection(stream: TcpStream) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(_) => return,
        };
        let (mut write, mut read) = ws_stream.split();

        while let Some(Ok(msg)) = read.next().await {
            if msg.is_text() || msg.is_binary() {
                if write.send(msg).await.is_err() {
                    break;
                }
            } else if msg.is_close() {
                break;
            }
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn write_and_read_roundtrip() {
    init_tracing();
    let server = EchoServer::start().await;
    let transport = WsTransport::new();

    transport.open(&server.ws_url(), None).await.unwrap();
    assert!(!transport.disconnected());

    let frame = json!({"op": 1, "d": 5});
    transport.write_json(frame.clone()).await.unwrap();

    let raw = transport.read().await.unwrap();
    let echoed: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(echoed, frame);

    transport.close().await.unwrap();
    assert!(transport.disconnected());
}

#[tokio::test(flavor = "multi_thread")]
async fn read_fails_after_close() {
    init_tracing();
    let server = EchoServer::start().await;
    let transport = WsTransport::new();

    transport.open(&server.ws_url(), None).await.unwrap();
    transport.close().await.unwrap();

    let result = transport.read().await;
    assert!(matches!(result, Err(GatewayError::TransportReadFailed(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn open_against_a_dead_port_fails() {
    init_tracing();
    let transport = WsTransport::new();
    let result = transport.open("ws://127.0.0.1:1", None).await;
    assert!(matches!(result, Err(GatewayError::TransportOpenFailed(_))));
    assert!(transport.disconnected());
}

#[tokio::test(flavor = "multi_thread")]
async fn upgrade_headers_are_applied() {
    init_tracing();
    let server = EchoServer::start().await;
    let transport = WsTransport::new();

    // An invalid header name is skipped, a valid one is sent; either way
    // the handshake completes.
    let headers = vec![
        ("x-client".to_string(), "discord-gateway".to_string()),
        ("bad header".to_string(), "nope".to_string()),
    ];
    transport.open(&server.ws_url(), Some(headers)).await.unwrap();
    assert!(!transport.disconnected());
}
