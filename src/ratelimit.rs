//! Outbound command rate limiter
//!
//! The gateway allows 120 commands per connection per 60 seconds, with a
//! separate 5-per-60-seconds cap on presence updates. Denied commands are
//! rejected synchronously; nothing is queued on the caller's behalf.

use crate::cmd;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

const GATEWAY_COMMANDS_PER_WINDOW: u32 = 120;
const STATUS_UPDATES_PER_WINDOW: u32 = 5;
const WINDOW: Duration = Duration::from_secs(60);

struct Bucket {
    limit: u32,
    remaining: u32,
    reset: Instant,
    window: Duration,
}

impl Bucket {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            remaining: limit,
            reset: Instant::now() + window,
            window,
        }
    }

    fn take(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.reset {
            self.remaining = self.limit;
            self.reset = now + self.window;
        }
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Per-command-kind token buckets for outbound gateway commands
pub(crate) struct RateLimiter {
    gateway: Mutex<Bucket>,
    status: Mutex<Bucket>,
}

impl RateLimiter {
    pub(crate) fn new() -> Self {
        Self::with_limits(
            GATEWAY_COMMANDS_PER_WINDOW,
            STATUS_UPDATES_PER_WINDOW,
            WINDOW,
        )
    }

    fn with_limits(gateway: u32, status: u32, window: Duration) -> Self {
        Self {
            gateway: Mutex::new(Bucket::new(gateway, window)),
            status: Mutex::new(Bucket::new(status, window)),
        }
    }

    /// Admit or reject an outbound command
    pub(crate) fn request(&self, command: &str) -> bool {
        match command {
            cmd::UPDATE_STATUS => self.status.lock().take(),
            _ => self.gateway.lock().take(),
        }
    }
}
