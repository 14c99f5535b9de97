//! Duplex WebSocket transport
//!
//! The session owns the transport; the receiver and emitter fibers hold
//! borrowed access to one half each, so the two halves live behind their
//! own async locks. `read` failures flip the connection flag, which is
//! how the receiver learns the peer is gone.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Abstract duplex WebSocket capability
///
/// The default implementation is [`WsTransport`]; tests inject their own
/// to drive the session without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`, applying any extra upgrade headers
    async fn open(&self, url: &str, headers: Option<Vec<(String, String)>>) -> Result<()>;

    /// Block until a complete message arrives or the connection dies
    async fn read(&self) -> Result<Vec<u8>>;

    /// Serialize `value` and transmit it as a text frame
    async fn write_json(&self, value: serde_json::Value) -> Result<()>;

    /// Send a close frame if possible and tear the connection down
    async fn close(&self) -> Result<()>;

    /// Whether the connection is known to be down
    fn disconnected(&self) -> bool;
}

/// TLS WebSocket transport over tokio-tungstenite
pub struct WsTransport {
    write: tokio::sync::Mutex<Option<WsSink>>,
    read: tokio::sync::Mutex<Option<WsSource>>,
    connected: AtomicBool,
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            write: tokio::sync::Mutex::new(None),
            read: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str, headers: Option<Vec<(String, String)>>) -> Result<()> {
        let mut request = url
            .into_client_request()
            .map_err(|e| GatewayError::TransportOpenFailed(e.to_string()))?;

        if let Some(headers) = headers {
            for (key, value) in headers {
                match (
                    key.parse::<http::header::HeaderName>(),
                    value.parse::<http::header::HeaderValue>(),
                ) {
                    (Ok(name), Ok(value)) => {
                        request.headers_mut().insert(name, value);
                    }
                    _ => warn!("invalid upgrade header: {}", key),
                }
            }
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| GatewayError::TransportOpenFailed(e.to_string()))?;
        debug!("websocket open: {}", url);

        let (sink, source) = stream.split();
        *self.write.lock().await = Some(sink);
        *self.read.lock().await = Some(source);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let mut guard = self.read.lock().await;
        let source = guard
            .as_mut()
            .ok_or_else(|| GatewayError::TransportReadFailed("not open".to_string()))?;

        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(GatewayError::TransportReadFailed(format!(
                        "close frame: {:?}",
                        frame
                    )));
                }
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(GatewayError::TransportReadFailed(e.to_string()));
                }
                None => {
                    self.connected.store(false, Ordering::Release);
                    return Err(GatewayError::TransportReadFailed("stream ended".to_string()));
                }
            }
        }
    }

    async fn write_json(&self, value: serde_json::Value) -> Result<()> {
        let text =
            serde_json::to_string(&value).map_err(|e| GatewayError::EncodeFailed(e.to_string()))?;

        let mut guard = self.write.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| GatewayError::TransportWriteFailed("not open".to_string()))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::TransportWriteFailed(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);

        // Closing the sink ends the stream, which releases the reader.
        if let Some(mut sink) = self.write.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
            sink.close()
                .await
                .map_err(|e| GatewayError::TransportCloseFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn disconnected(&self) -> bool {
        !self.connected.load(Ordering::Acquire)
    }
}
