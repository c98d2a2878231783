use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::SecurityConfig;

/// Default hard cap on distinct keys held in the ledger
pub const MAX_TRACKED_KEYS: usize = 10_000;

/// Sliding-log limiter keyed by action (e.g. `login:alice@example.com`).
/// Attempts older than the window are pruned when the key is next touched,
/// and keys with no recent attempts are swept once per window.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: usize,
    window: Duration,
    max_tracked_keys: usize,
    ledger: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    attempts: HashMap<String, Vec<Instant>>,
    last_sweep: Option<Instant>,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            max_tracked_keys: MAX_TRACKED_KEYS,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(
            config.rate_limit_max_attempts,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    pub fn with_max_tracked_keys(mut self, max_tracked_keys: usize) -> Self {
        self.max_tracked_keys = max_tracked_keys;
        self
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // A panic while holding the lock leaves the ledger usable
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(&self, log: &mut Vec<Instant>, now: Instant) {
        log.retain(|at| now.saturating_duration_since(*at) < self.window);
    }

    fn sweep(&self, ledger: &mut Ledger, now: Instant) {
        let before = ledger.attempts.len();
        ledger.attempts.retain(|_, log| {
            log.retain(|at| now.saturating_duration_since(*at) < self.window);
            !log.is_empty()
        });
        ledger.last_sweep = Some(now);

        let dropped = before - ledger.attempts.len();
        if dropped > 0 {
            debug!("Rate limiter swept {} idle keys, {} remain", dropped, ledger.attempts.len());
        }
    }

    /// Record an attempt for `key`; `false` when the key is over its limit
    /// or the ledger is full of active keys
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut ledger = self.ledger();

        match ledger.last_sweep {
            Some(at) if now.saturating_duration_since(at) < self.window => {}
            _ => self.sweep(&mut ledger, now),
        }

        if !ledger.attempts.contains_key(key) && ledger.attempts.len() >= self.max_tracked_keys {
            self.sweep(&mut ledger, now);
            if ledger.attempts.len() >= self.max_tracked_keys {
                warn!("Rate limiter is tracking {} keys, refusing {}", ledger.attempts.len(), key);
                return false;
            }
        }

        let log = ledger.attempts.entry(key.to_string()).or_default();
        self.prune(log, now);

        if log.len() >= self.max_attempts {
            warn!("Rate limit exceeded for {}", key);
            return false;
        }
        log.push(now);
        true
    }

    pub fn remaining(&self, key: &str) -> usize {
        self.remaining_at(key, Instant::now())
    }

    pub fn remaining_at(&self, key: &str, now: Instant) -> usize {
        let mut ledger = self.ledger();
        let used = match ledger.attempts.get_mut(key) {
            Some(log) => {
                self.prune(log, now);
                log.len()
            }
            None => return self.max_attempts,
        };
        if used == 0 {
            ledger.attempts.remove(key);
        }
        self.max_attempts.saturating_sub(used)
    }

    /// Forget all attempts for `key`, e.g. after a successful login
    pub fn reset(&self, key: &str) {
        self.ledger().attempts.remove(key);
    }

    /// Number of distinct keys currently held
    pub fn tracked_keys(&self) -> usize {
        self.ledger().attempts.len()
    }
}
