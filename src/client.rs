//! Gateway session client
//!
//! Composes the transport, codec, rate limiter, heartbeat pulsator and
//! reconnect controller into one session. Per active session there is a
//! receiver task blocked in `read`, an emitter task draining one FIFO
//! channel, an operation-demultiplexer thread, at most one pulsator and
//! short-lived watchdog tasks.

use crate::cmd;
use crate::config::Config;
use crate::discovery;
use crate::error::{GatewayError, Result};
use crate::event::{self, Event};
use crate::heartbeat;
use crate::opcode;
use crate::packet::{
    ClientPacket, GatewayPacket, HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload,
    ResumePayload,
};
use crate::ratelimit::RateLimiter;
use crate::state::SessionState;
use crate::transport::{Transport, WsTransport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_RECONNECT_TRIES: u32 = 5;
const CHANNEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client for one gateway session
///
/// Cheap to clone; all clones drive the same session. Must be created
/// from within a Tokio runtime, which hosts the session's I/O tasks.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

impl GatewayClient {
    /// Create a client over the default TLS WebSocket transport
    pub fn new(conf: Config) -> Self {
        Self::with_transport(conf, Arc::new(WsTransport::new()))
    }

    /// Create a client over a caller-supplied transport
    ///
    /// This is the seam the integration tests use to drive the session
    /// without a network.
    pub fn with_transport(conf: Config, transport: Arc<dyn Transport>) -> Self {
        let (restart_tx, restart_rx) = crossbeam_channel::bounded(1);
        let (receive_tx, receive_rx) = crossbeam_channel::unbounded();
        let (emit_tx, emit_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(conf.channel_buffer);

        let inner = Arc::new(ClientInner {
            conf,
            transport,
            state: SessionState::new(),
            ratelimit: RateLimiter::new(),
            running: AtomicBool::new(true),
            restart_tx,
            restart_rx,
            receive_tx,
            receive_rx,
            emit_tx,
            emit_rx,
            event_tx,
            event_rx,
            discovered_endpoint: Mutex::new(None),
            timeout_multiplier: AtomicU32::new(1),
            runtime: tokio::runtime::Handle::current(),
        });

        let ops_inner = Arc::clone(&inner);
        std::thread::spawn(move || operation_handlers(ops_inner));

        Self { inner }
    }

    /// Establish the gateway connection
    ///
    /// Discovers the endpoint when the configuration does not pin one,
    /// opens the transport and spawns the receiver and emitter tasks.
    /// Fails with [`GatewayError::AlreadyConnected`] when a connection
    /// already exists.
    pub async fn connect(&self) -> Result<()> {
        ClientInner::connect(&self.inner).await
    }

    /// Close the gateway connection
    ///
    /// Routes a logical close through the emitter so in-flight frames
    /// drain in order, then waits a short grace period.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Disconnect and terminate every session fiber
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.inner.disconnect().await;
        self.inner.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Send a gateway command
    ///
    /// The command name is mapped to its op code, checked against the
    /// rate limiter and enqueued for the emitter. Never writes to the
    /// transport directly.
    pub fn emit(&self, command: &str, data: Option<serde_json::Value>) -> Result<()> {
        self.inner.emit(command, data)
    }

    /// The channel carrying tracked events
    pub fn events(&self) -> Receiver<Event> {
        self.inner.event_rx.clone()
    }

    /// Mark an event name as interesting; untracked dispatches are dropped
    pub fn register_event(&self, name: &str) {
        self.inner.state.register_event(name);
    }

    /// Remove an event name from the tracked set
    pub fn remove_event(&self, name: &str) {
        self.inner.state.remove_event(name);
    }

    /// Round-trip time of the most recent confirmed heartbeat
    pub fn heartbeat_latency(&self) -> Result<Duration> {
        self.inner
            .state
            .heartbeat_latency()
            .ok_or(GatewayError::LatencyUnknown)
    }

    /// Scale the invalid-session retry jitter and disconnect grace
    ///
    /// Tests set this to zero to keep teardown fast.
    pub fn set_timeout_multiplier(&self, multiplier: u32) {
        self.inner
            .timeout_multiplier
            .store(multiplier, Ordering::Release);
    }
}

pub(crate) struct ClientInner {
    pub(crate) conf: Config,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) state: SessionState,
    ratelimit: RateLimiter,
    pub(crate) running: AtomicBool,
    restart_tx: Sender<()>,
    pub(crate) restart_rx: Receiver<()>,
    receive_tx: Sender<GatewayPacket>,
    receive_rx: Receiver<GatewayPacket>,
    emit_tx: Sender<ClientPacket>,
    emit_rx: Receiver<ClientPacket>,
    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    discovered_endpoint: Mutex<Option<String>>,
    timeout_multiplier: AtomicU32,
    runtime: tokio::runtime::Handle,
}

impl ClientInner {
    pub(crate) async fn connect(inner: &Arc<ClientInner>) -> Result<()> {
        if !inner.state.begin_connect() {
            return Err(GatewayError::AlreadyConnected);
        }
        match Self::open_and_spawn(inner).await {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.state.force_disconnected();
                let _ = inner.transport.close().await;
                Err(e)
            }
        }
    }

    async fn open_and_spawn(inner: &Arc<ClientInner>) -> Result<()> {
        let url = inner.endpoint().await?;
        inner.transport.open(&url, None).await?;
        inner.state.mark_connected_once();
        inner.runtime.spawn(receiver(Arc::clone(inner)));
        inner.runtime.spawn(emitter(Arc::clone(inner)));
        Ok(())
    }

    async fn endpoint(&self) -> Result<String> {
        if let Some(endpoint) = &self.conf.endpoint {
            return Ok(endpoint.clone());
        }
        if let Some(cached) = self.discovered_endpoint.lock().clone() {
            return Ok(cached);
        }
        let http = self
            .conf
            .http_client
            .clone()
            .unwrap_or_else(reqwest::Client::new);
        let url = discovery::gateway_url(&http, self.conf.version, &self.conf.encoding).await?;
        *self.discovered_endpoint.lock() = Some(url.clone());
        Ok(url)
    }

    pub(crate) async fn disconnect(&self) -> Result<()> {
        if self.transport.disconnected() || !self.state.have_connected_once() {
            self.state.force_disconnected();
            return Err(GatewayError::NotConnected);
        }

        // The emitter owns the teardown so queued frames go out first.
        self.emit(cmd::CLOSE, None)?;
        self.state.force_disconnected();

        let grace = Duration::from_secs(1) * self.timeout_multiplier() + Duration::from_millis(10);
        tokio::time::sleep(grace).await;
        Ok(())
    }

    pub(crate) fn emit(&self, command: &str, data: Option<serde_json::Value>) -> Result<()> {
        if !self.state.have_connected_once() {
            return Err(GatewayError::NotConnected);
        }
        let op = cmd::opcode_for(command)
            .ok_or_else(|| GatewayError::UnsupportedCommand(command.to_string()))?;
        if !opcode::is_internal(op) && !self.ratelimit.request(command) {
            return Err(GatewayError::RateLimited(command.to_string()));
        }
        self.emit_tx
            .send(ClientPacket { op, d: data })
            .map_err(|e| GatewayError::ChannelSend(e.to_string()))
    }

    fn send_identify(&self) -> Result<()> {
        let conf = &self.conf;
        let payload = IdentifyPayload {
            token: conf.token.clone(),
            properties: IdentifyProperties {
                os: std::env::consts::OS.to_string(),
                browser: conf.browser.clone(),
                device: conf.device.clone(),
            },
            compress: false,
            large_threshold: conf.guild_large_threshold,
            shard: (conf.shard_count > 1).then(|| [conf.shard_id, conf.shard_count]),
            presence: None,
        };
        let data =
            serde_json::to_value(&payload).map_err(|e| GatewayError::EncodeFailed(e.to_string()))?;
        self.emit(cmd::IDENTIFY, Some(data))
    }

    fn send_resume(&self) -> Result<()> {
        let (session_id, seq) = self.state.resume_info();
        let payload = ResumePayload {
            token: self.conf.token.clone(),
            session_id,
            seq,
        };
        let data =
            serde_json::to_value(&payload).map_err(|e| GatewayError::EncodeFailed(e.to_string()))?;
        self.emit(cmd::RESUME, Some(data))
    }

    pub(crate) fn timeout_multiplier(&self) -> u32 {
        self.timeout_multiplier.load(Ordering::Acquire)
    }
}

/// Debounced reconnect with bounded backoff
///
/// Entries within the debounce window of a previous reconnect return
/// silently. Exhausting the bounded retries is terminal for the session.
pub(crate) async fn reconnect(inner: Arc<ClientInner>) -> Result<()> {
    if !inner.running.load(Ordering::Acquire) {
        return Ok(());
    }
    if !inner.state.lock_restart() {
        return Ok(());
    }

    // Wake the pulsator so the single-flight token is free for the next
    // connection's pulsator.
    let _ = inner.restart_tx.try_send(());
    let _ = inner.disconnect().await;

    for attempt in 0..MAX_RECONNECT_TRIES {
        debug!("reconnect attempt #{}", attempt + 1);
        match ClientInner::connect(&inner).await {
            Ok(()) => {
                info!("successfully reconnected");
                return Ok(());
            }
            Err(e) => {
                if attempt + 1 == MAX_RECONNECT_TRIES {
                    break;
                }
                let delay = Duration::from_secs(u64::from((attempt + 3) * 2));
                info!("reconnect failed, trying again in {:?}: {}", delay, e);
                if !sleep_unless_shutdown(&inner, delay).await {
                    return Ok(());
                }
            }
        }
    }
    Err(GatewayError::TooManyReconnectAttempts)
}

/// Sleep for `total`, polling the running flag
///
/// Returns false when shutdown interrupted the wait.
async fn sleep_unless_shutdown(inner: &ClientInner, total: Duration) -> bool {
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        if !inner.running.load(Ordering::Acquire) {
            return false;
        }
        let chunk = CHANNEL_POLL_INTERVAL.min(total - elapsed);
        tokio::time::sleep(chunk).await;
        elapsed += chunk;
    }
    true
}

/// Read pump: transport frames to the inbound channel
///
/// Any read error terminates the task; liveness recovery is the
/// heartbeat watchdog's job, not the reader's.
async fn receiver(inner: Arc<ClientInner>) {
    loop {
        let raw = match inner.transport.read().await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("closing read pump: {}", e);
                return;
            }
        };

        let packet: GatewayPacket = match serde_json::from_slice(&raw) {
            Ok(packet) => packet,
            Err(e) => {
                error!("{}", GatewayError::DecodeFailed(e.to_string()));
                continue;
            }
        };

        if inner.receive_tx.send(packet).is_err() {
            return;
        }
        if !inner.running.load(Ordering::Acquire) {
            return;
        }
    }
}

/// Write pump: drains the outbound channel into the transport
///
/// An internal shutdown/close marker with no payload closes the
/// transport and ends the task. Write failures are logged and the task
/// keeps going; the ACK watchdog catches a dead peer.
async fn emitter(inner: Arc<ClientInner>) {
    loop {
        let rx = inner.emit_rx.clone();
        let msg =
            tokio::task::spawn_blocking(move || rx.recv_timeout(CHANNEL_POLL_INTERVAL)).await;

        match msg {
            Ok(Ok(packet)) => {
                if packet.d.is_none() && opcode::is_internal(packet.op) {
                    let _ = inner.transport.close().await;
                    return;
                }
                match serde_json::to_value(&packet) {
                    Ok(value) => {
                        if let Err(e) = inner.transport.write_json(value).await {
                            warn!("could not send data to the gateway: {}", e);
                        }
                    }
                    Err(e) => warn!("could not encode outbound packet: {}", e),
                }
            }
            Ok(Err(RecvTimeoutError::Timeout)) => {
                if !inner.running.load(Ordering::Acquire) {
                    let _ = inner.transport.close().await;
                    return;
                }
            }
            Ok(Err(RecvTimeoutError::Disconnected)) | Err(_) => return,
        }
    }
}

/// Operation demultiplexer: one thread switching on inbound op codes
fn operation_handlers(inner: Arc<ClientInner>) {
    debug!("ready to receive operation codes");
    loop {
        let packet = match inner.receive_rx.recv_timeout(CHANNEL_POLL_INTERVAL) {
            Ok(packet) => packet,
            Err(RecvTimeoutError::Timeout) => {
                if !inner.running.load(Ordering::Acquire) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match packet.op {
            opcode::DISCORD_EVENT => handle_event(&inner, packet),
            opcode::HEARTBEAT => {
                let sequence = inner.state.sequence_number();
                if let Err(e) = inner.emit(cmd::HEARTBEAT, Some(json!(sequence))) {
                    warn!("could not answer heartbeat request: {}", e);
                }
            }
            opcode::RECONNECT => {
                info!("gateway requested a reconnect");
                let task_inner = Arc::clone(&inner);
                inner.runtime.spawn(async move {
                    if let Err(e) = reconnect(task_inner).await {
                        error!("requested reconnect failed: {}", e);
                    }
                });
            }
            opcode::INVALID_SESSION => {
                info!("gateway invalidated the session");
                let task_inner = Arc::clone(&inner);
                inner.runtime.spawn(async move {
                    let jitter = rand::thread_rng().gen_range(1..=4u64)
                        * u64::from(task_inner.timeout_multiplier());
                    tokio::time::sleep(Duration::from_secs(jitter)).await;
                    if let Err(e) = task_inner.send_identify() {
                        error!("re-identify failed: {}", e);
                    }
                });
            }
            opcode::HELLO => {
                match serde_json::from_slice::<HelloPayload>(&packet.data_bytes()) {
                    Ok(hello) => inner.state.set_heartbeat_interval(hello.heartbeat_interval),
                    Err(e) => debug!("malformed hello payload: {}", e),
                }
                inner.runtime.spawn(heartbeat::pulsate(Arc::clone(&inner)));

                // A session that never identified gets a fresh identify;
                // anything else replays from the stored sequence.
                let result = if inner.state.is_fresh() {
                    inner.send_identify()
                } else {
                    inner.send_resume()
                };
                if let Err(e) = result {
                    error!("could not answer hello: {}", e);
                }
            }
            opcode::HEARTBEAT_ACK => inner.state.record_heartbeat_ack(),
            op => debug!("unknown operation: {}", op),
        }
    }
    debug!("exiting operation handler");
}

fn handle_event(inner: &Arc<ClientInner>, packet: GatewayPacket) {
    let incoming = packet.s.unwrap_or(0);
    if !inner.state.commit_sequence(incoming) {
        info!("gateway sequence numbers mismatch, forcing reconnect");
        let task_inner = Arc::clone(inner);
        inner.runtime.spawn(async move {
            if let Err(e) = reconnect(task_inner).await {
                error!("reconnect after sequence gap failed: {}", e);
            }
        });
        return;
    }

    let name = packet.t.clone().unwrap_or_default();
    if name == event::READY {
        match serde_json::from_slice::<ReadyPayload>(&packet.data_bytes()) {
            Ok(ready) => inner.state.set_ready(ready.session_id, ready.trace),
            Err(e) => error!("malformed ready payload: {}", e),
        }
    } else if name == event::RESUMED {
        // resume confirmed; the stored sequence keeps advancing as usual
    } else if !inner.state.event_of_interest(&name) {
        return;
    }

    // Bounded channel: a slow consumer back-pressures this handler.
    let _ = inner.event_tx.send(Event {
        name,
        data: packet.data_bytes(),
    });
}
