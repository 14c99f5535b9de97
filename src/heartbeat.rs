//! Heartbeat pulsator
//!
//! One pulsator per connection, enforced by the single-flight token in
//! the session state. Each beat snapshots the last acknowledgement and
//! spawns its own watchdog: a stalled peer is detected per beat, even if
//! no further beats are ever attempted.

use crate::client::{reconnect, ClientInner};
use crate::cmd;
use rand::Rng;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Hard deadline for the gateway to acknowledge a heartbeat
const ACK_DEADLINE: Duration = Duration::from_secs(3);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Send heartbeats until shutdown or restart
///
/// Spawned once per Hello. The first beat goes out immediately so a
/// born-dead connection is detected within one ACK deadline.
pub(crate) async fn pulsate(inner: Arc<ClientInner>) {
    let service_id = rand::thread_rng().gen_range(1..=u8::MAX);
    if !inner.state.allowed_to_start_pulsating(service_id) {
        return;
    }

    // A restart queued before this pulsator existed belongs to an older
    // connection.
    while inner.restart_rx.try_recv().is_ok() {}

    let interval = Duration::from_millis(u64::from(inner.state.heartbeat_interval_ms().max(1)));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    debug!("pulsator {} started, interval {:?}", service_id, interval);
    let cancel = Arc::new(Notify::new());

    loop {
        let (previous_ack, sequence) = inner.state.pulse_snapshot();
        if let Err(e) = inner.emit(cmd::HEARTBEAT, Some(json!(sequence))) {
            warn!("could not emit heartbeat: {}", e);
        }
        let sent = Instant::now();

        tokio::spawn(watchdog(
            Arc::clone(&inner),
            previous_ack,
            sent,
            Arc::clone(&cancel),
        ));

        tokio::select! {
            biased;
            _ = wait_for_stop(&inner) => break,
            _ = ticker.tick() => continue,
        }
    }

    debug!("stopping pulse");
    cancel.notify_waiters();
    inner.state.stop_pulsating(service_id);
}

/// Per-beat ACK watchdog
///
/// After the deadline: a fresh acknowledgement updates the measured
/// latency, a stale one forces a reconnect. Cancelled when the owning
/// pulsator exits.
async fn watchdog(
    inner: Arc<ClientInner>,
    previous_ack: Option<Instant>,
    sent: Instant,
    cancel: Arc<Notify>,
) {
    tokio::select! {
        _ = cancel.notified() => return,
        _ = tokio::time::sleep(ACK_DEADLINE) => {}
    }

    match inner.state.last_heartbeat_ack() {
        Some(ack) if previous_ack.map_or(true, |prev| ack > prev) => {
            inner
                .state
                .set_heartbeat_latency(ack.saturating_duration_since(sent));
        }
        _ => {
            info!("heartbeat ACK was not received, forcing reconnect");
            if let Err(e) = reconnect(inner).await {
                error!("reconnect after missed ACK failed: {}", e);
            }
        }
    }
}

/// Resolve when the session shuts down or a restart is signalled
async fn wait_for_stop(inner: &ClientInner) {
    loop {
        if !inner.running.load(Ordering::Acquire) {
            return;
        }
        if inner.restart_rx.try_recv().is_ok() {
            return;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
}
