//! Guarded session state
//!
//! One reader-writer lock covers the hot session fields; the restart
//! debounce clock and the pulse single-flight token live in their own
//! finer-grained primitives so they never contend with session readers.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const RESTART_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Default)]
struct HotState {
    session_id: String,
    sequence_number: u64,
    heartbeat_interval_ms: u32,
    last_heartbeat_ack: Option<Instant>,
    heartbeat_latency: Option<Duration>,
    trace: Vec<String>,
}

/// Shared mutable state of one gateway session
pub(crate) struct SessionState {
    hot: RwLock<HotState>,
    tracked_events: RwLock<HashSet<String>>,
    last_restart: Mutex<Option<Instant>>,
    pulse_token: AtomicU8,
    disconnected: AtomicBool,
    have_connected_once: AtomicBool,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            hot: RwLock::new(HotState::default()),
            tracked_events: RwLock::new(HashSet::new()),
            last_restart: Mutex::new(None),
            pulse_token: AtomicU8::new(0),
            disconnected: AtomicBool::new(true),
            have_connected_once: AtomicBool::new(false),
        }
    }

    // --- connection flags ---

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Claim the disconnected -> connecting transition; loses the race
    /// when a connection already exists
    pub(crate) fn begin_connect(&self) -> bool {
        self.disconnected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_connected_once(&self) {
        self.have_connected_once.store(true, Ordering::Release);
    }

    pub(crate) fn have_connected_once(&self) -> bool {
        self.have_connected_once.load(Ordering::Acquire)
    }

    pub(crate) fn force_disconnected(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    // --- sequence integrity ---

    /// Increment the sequence counter for an inbound dispatch and verify
    /// it against the packet's own number
    ///
    /// A mismatch rolls the increment back and returns `false`: the
    /// counter only ever reflects successfully processed events.
    pub(crate) fn commit_sequence(&self, incoming: u64) -> bool {
        let mut hot = self.hot.write();
        hot.sequence_number += 1;
        if incoming != hot.sequence_number {
            hot.sequence_number -= 1;
            return false;
        }
        true
    }

    pub(crate) fn sequence_number(&self) -> u64 {
        self.hot.read().sequence_number
    }

    // --- session identity ---

    pub(crate) fn set_ready(&self, session_id: String, trace: Vec<String>) {
        let mut hot = self.hot.write();
        hot.session_id = session_id;
        hot.trace = trace;
    }

    pub(crate) fn session_id(&self) -> String {
        self.hot.read().session_id.clone()
    }

    /// Whether this session has never identified: no session id and no
    /// processed events
    pub(crate) fn is_fresh(&self) -> bool {
        let hot = self.hot.read();
        hot.session_id.is_empty() && hot.sequence_number == 0
    }

    /// Session id and sequence for a resume payload
    pub(crate) fn resume_info(&self) -> (String, u64) {
        let hot = self.hot.read();
        (hot.session_id.clone(), hot.sequence_number)
    }

    // --- heartbeat bookkeeping ---

    pub(crate) fn set_heartbeat_interval(&self, interval_ms: u32) {
        self.hot.write().heartbeat_interval_ms = interval_ms;
    }

    pub(crate) fn heartbeat_interval_ms(&self) -> u32 {
        self.hot.read().heartbeat_interval_ms
    }

    pub(crate) fn record_heartbeat_ack(&self) {
        self.hot.write().last_heartbeat_ack = Some(Instant::now());
    }

    pub(crate) fn last_heartbeat_ack(&self) -> Option<Instant> {
        self.hot.read().last_heartbeat_ack
    }

    /// Snapshot taken at the top of each pulse iteration
    pub(crate) fn pulse_snapshot(&self) -> (Option<Instant>, u64) {
        let hot = self.hot.read();
        (hot.last_heartbeat_ack, hot.sequence_number)
    }

    pub(crate) fn set_heartbeat_latency(&self, latency: Duration) {
        self.hot.write().heartbeat_latency = Some(latency);
    }

    pub(crate) fn heartbeat_latency(&self) -> Option<Duration> {
        self.hot.read().heartbeat_latency
    }

    // --- pulse single-flight token ---

    /// Claim the pulse token for `service_id`; only one pulsator may hold
    /// it at a time. Callers must release with [`stop_pulsating`].
    ///
    /// [`stop_pulsating`]: SessionState::stop_pulsating
    pub(crate) fn allowed_to_start_pulsating(&self, service_id: u8) -> bool {
        match self
            .pulse_token
            .compare_exchange(0, service_id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == service_id,
        }
    }

    /// Release the pulse token, but only if `service_id` still owns it
    pub(crate) fn stop_pulsating(&self, service_id: u8) {
        let _ = self.pulse_token.compare_exchange(
            service_id,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    #[cfg(test)]
    pub(crate) fn pulse_token(&self) -> u8 {
        self.pulse_token.load(Ordering::Acquire)
    }

    // --- restart debounce ---

    /// Claim the restart slot; reconnects within the debounce window of
    /// the previous one are dropped
    pub(crate) fn lock_restart(&self) -> bool {
        let mut last = self.last_restart.lock();
        let now = Instant::now();
        let allowed = last.map_or(true, |t| now.duration_since(t) >= RESTART_DEBOUNCE);
        if allowed {
            *last = Some(now);
        }
        allowed
    }

    // --- tracked events ---

    pub(crate) fn register_event(&self, name: &str) {
        self.tracked_events.write().insert(name.to_string());
    }

    pub(crate) fn remove_event(&self, name: &str) {
        self.tracked_events.write().remove(name);
    }

    pub(crate) fn event_of_interest(&self, name: &str) -> bool {
        self.tracked_events.read().contains(name)
    }
}
