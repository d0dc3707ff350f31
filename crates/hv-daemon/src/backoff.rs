//! Retry delays for ledger polling
//!
//! A freshly broadcast session takes a few blocks to show up. The poll
//! schedule yields the pause before each retry: doubling from the
//! configured interval, capped, with up to 10% random jitter added.

use std::time::Duration;

use rand::Rng;

use hv_core::config::LedgerConfig;

/// Upper bound on a single pause
const MAX_POLL_DELAY: Duration = Duration::from_secs(30);

const JITTER: f64 = 0.1;

/// Finite sequence of pauses between lookups
#[derive(Debug, Clone)]
pub struct PollSchedule {
    next: Duration,
    cap: Duration,
    jitter: f64,
    /// Pauses left to hand out
    remaining: u32,
}

impl PollSchedule {
    /// Schedule for waiting on a new session: `poll_attempts` lookups means
    /// one fewer pause
    pub fn for_sessions(config: &LedgerConfig) -> Self {
        Self::new(
            config.poll_interval,
            MAX_POLL_DELAY,
            JITTER,
            config.poll_attempts.saturating_sub(1),
        )
    }

    pub fn new(initial: Duration, cap: Duration, jitter: f64, pauses: u32) -> Self {
        Self {
            next: initial.min(cap),
            cap,
            jitter: jitter.clamp(0.0, 1.0),
            remaining: pauses,
        }
    }
}

impl Iterator for PollSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next;
        self.next = base.saturating_mul(2).min(self.cap);

        let spread = base.mul_f64(self.jitter * rand::thread_rng().gen::<f64>());
        Some(base + spread)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}
