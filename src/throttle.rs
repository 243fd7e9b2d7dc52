//! Sliding-window request throttle.
//!
//! Each key owns a queue of admission instants. An admission check purges
//! instants older than the window, rejects when the queue is full, and
//! otherwise records `now`. The whole read-purge-check-append sequence runs
//! under one mutex, so two concurrent callers can never both take the last
//! slot.
//!
//! Keys whose newest admission has aged out are swept at most once per
//! window, so the map only holds clients seen within the last window.
//!
//! The throttle is an ordinary value owned by whoever builds it (normally
//! [`crate::Generator`]); tests construct independent instances and drive
//! them with a [`ManualClock`].

use crate::config::ThrottleScope;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Source of "now" for the throttle.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Key used for the shared window in [`ThrottleScope::Global`] mode, and for
/// callers without a key in [`ThrottleScope::PerClient`] mode.
const GLOBAL_KEY: &str = "";

/// In-memory sliding-window rate limiter.
pub struct RequestThrottle {
    max_requests: usize,
    window: Duration,
    scope: ThrottleScope,
    clock: Arc<dyn Clock>,
    state: Mutex<Windows>,
}

struct Windows {
    by_key: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl RequestThrottle {
    /// Throttle on the system clock.
    pub fn new(max_requests: usize, window: Duration, scope: ThrottleScope) -> Self {
        Self::with_clock(max_requests, window, scope, Arc::new(SystemClock))
    }

    pub fn with_clock(
        max_requests: usize,
        window: Duration,
        scope: ThrottleScope,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_sweep = clock.now();
        Self {
            max_requests,
            window,
            scope,
            clock,
            state: Mutex::new(Windows {
                by_key: HashMap::new(),
                last_sweep,
            }),
        }
    }

    /// Try to admit one request for `key`.
    ///
    /// Returns `false` when the window for that key (or the global window) is
    /// already full. A rejected attempt is not recorded.
    pub fn admit(&self, key: Option<&str>) -> bool {
        let key = self.bucket(key);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Read under the lock so each queue stays ordered.
        let now = self.clock.now();

        if now.saturating_duration_since(state.last_sweep) >= self.window {
            self.sweep(&mut state, now);
        }

        let stamps = state.by_key.entry(key.to_string()).or_default();

        while let Some(&oldest) = stamps.front() {
            if now.saturating_duration_since(oldest) > self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.max_requests {
            warn!(
                "Throttle: rejected request for {:?} ({} in last {:?})",
                key,
                stamps.len(),
                self.window
            );
            return false;
        }

        stamps.push_back(now);
        debug!(
            "Throttle: admitted request for {:?} ({}/{})",
            key,
            stamps.len(),
            self.max_requests
        );
        true
    }

    /// Number of admissions currently counted against `key`, without purging.
    #[cfg(test)]
    pub(crate) fn in_flight(&self, key: Option<&str>) -> usize {
        let key = self.bucket(key);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.by_key.get(key).map_or(0, VecDeque::len)
    }

    fn bucket<'a>(&self, key: Option<&'a str>) -> &'a str {
        match self.scope {
            ThrottleScope::Global => GLOBAL_KEY,
            ThrottleScope::PerClient => key.unwrap_or(GLOBAL_KEY),
        }
    }

    /// Drop every key whose newest admission is older than the window.
    fn sweep(&self, state: &mut Windows, now: Instant) {
        let before = state.by_key.len();
        state.by_key.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) <= self.window)
        });
        state.last_sweep = now;
        let dropped = before - state.by_key.len();
        if dropped > 0 {
            debug!("Throttle: swept {} idle keys, {} tracked", dropped, state.by_key.len());
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_key
            .len()
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("scope", &self.scope)
            .finish()
    }
}
