//! Common test utilities for the gateway integration tests

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use discord_gateway::{Config, GatewayClient, GatewayError, Transport};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

static TRACING: Once = Once::new();

/// Initialize tracing once for the whole test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_target(false).try_init();
    });
}

/// In-memory transport that lets a test play the gateway's role
///
/// Inbound frames are fed by the test; outbound frames are captured for
/// inspection. `close` flips the connected flag, which makes pending
/// reads fail the way a torn socket would.
pub struct MockTransport {
    inbound_tx: Sender<Vec<u8>>,
    inbound_rx: Receiver<Vec<u8>>,
    outbound_tx: Sender<serde_json::Value>,
    outbound_rx: Receiver<serde_json::Value>,
    connected: AtomicBool,
    open_calls: AtomicUsize,
    refuse_opens: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        Arc::new(Self {
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
            connected: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
            refuse_opens: AtomicBool::new(false),
        })
    }

    /// Feed a raw inbound frame to the session
    pub fn feed(&self, frame: impl Into<Vec<u8>>) {
        self.inbound_tx.send(frame.into()).unwrap();
    }

    /// Feed an inbound frame from a JSON value
    pub fn feed_json(&self, value: serde_json::Value) {
        self.feed(value.to_string().into_bytes());
    }

    /// How many times the session opened this transport
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::Acquire)
    }

    /// Make subsequent opens fail, to exercise the retry path
    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse_opens.store(refuse, Ordering::Release);
    }

    /// Wait until the session has written a frame with the given op code
    ///
    /// Frames with other op codes are discarded while scanning.
    pub async fn expect_op(&self, op: u8, timeout: Duration) -> Option<serde_json::Value> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.outbound_rx.try_recv() {
                Ok(value) if value["op"] == serde_json::json!(op) => return Some(value),
                Ok(_) => continue,
                Err(_) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Collect up to `count` written frames within `timeout`
    pub fn collect_written(&self, count: usize, timeout: Duration) -> Vec<serde_json::Value> {
        let deadline = Instant::now() + timeout;
        let mut frames = Vec::new();
        while frames.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.outbound_rx.recv_timeout(remaining) {
                Ok(value) => frames.push(value),
                Err(_) => break,
            }
        }
        frames
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str, _headers: Option<Vec<(String, String)>>) -> discord_gateway::Result<()> {
        self.open_calls.fetch_add(1, Ordering::AcqRel);
        if self.refuse_opens.load(Ordering::Acquire) {
            return Err(GatewayError::TransportOpenFailed("refused by test".to_string()));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn read(&self) -> discord_gateway::Result<Vec<u8>> {
        loop {
            if !self.connected.load(Ordering::Acquire) {
                return Err(GatewayError::TransportReadFailed("closed".to_string()));
            }
            let rx = self.inbound_rx.clone();
            match tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_millis(50)))
                .await
            {
                Ok(Ok(frame)) => return Ok(frame),
                Ok(Err(RecvTimeoutError::Timeout)) => continue,
                _ => return Err(GatewayError::TransportReadFailed("channel closed".to_string())),
            }
        }
    }

    async fn write_json(&self, value: serde_json::Value) -> discord_gateway::Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(GatewayError::TransportWriteFailed("not open".to_string()));
        }
        self.outbound_tx
            .send(value)
            .map_err(|e| GatewayError::TransportWriteFailed(e.to_string()))
    }

    async fn close(&self) -> discord_gateway::Result<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn disconnected(&self) -> bool {
        !self.connected.load(Ordering::Acquire)
    }
}

/// Configuration used by every session test
pub fn test_config() -> Config {
    let mut conf = Config::new("test-token");
    conf.endpoint = Some("ws://gateway.test".to_string());
    conf.browser = "discord-gateway".to_string();
    conf.device = "discord-gateway".to_string();
    conf
}

/// A connected client over a mock transport, with fast timers
pub async fn connected_client() -> (GatewayClient, Arc<MockTransport>) {
    init_tracing();
    let transport = MockTransport::new();
    let client =
        GatewayClient::with_transport(test_config(), Arc::clone(&transport) as Arc<dyn Transport>);
    client.set_timeout_multiplier(0);
    client.connect().await.expect("connect over mock transport");
    (client, transport)
}

