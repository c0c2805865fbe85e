// src/cooldown.rs
//! Cooldown gate with an injectable clock

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Millisecond wall clock
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let by = duration_ms(by);
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(by)));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Milliseconds in `d`, saturating at `i64::MAX`
fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Admits one run per window. A run is admitted when strictly more than
/// `window` has passed since the last admitted run; the timestamp moves at
/// admission, before the run does any work.
pub struct Cooldown {
    clock: Arc<dyn Clock>,
    window_ms: i64,
    /// `None` until the first admitted run; the first attempt always passes.
    last_run_ms: Mutex<Option<i64>>,
}

impl Cooldown {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window_ms: duration_ms(window),
            last_run_ms: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.window_ms).unwrap_or(0))
    }

    /// Check and stamp in one step
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now_ms();
        let mut last = self
            .last_run_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let admitted = match *last {
            None => true,
            Some(prev) => now.saturating_sub(prev) > self.window_ms,
        };
        if admitted {
            *last = Some(now);
        }
        admitted
    }

    /// Stamp unconditionally, restarting the window from now
    pub fn reset(&self) {
        let now = self.clock.now_ms();
        *self
            .last_run_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(now);
    }

    /// Clock reading of the last admitted run, `None` before the first one
    pub fn last_run_ms(&self) -> Option<i64> {
        *self
            .last_run_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Time until the next `try_acquire` would succeed
    pub fn remaining(&self) -> Duration {
        let Some(last) = self.last_run_ms() else {
            return Duration::ZERO;
        };
        let elapsed = self.clock.now_ms().saturating_sub(last);
        let left = self.window_ms.saturating_add(1).saturating_sub(elapsed);
        Duration::from_millis(u64::try_from(left).unwrap_or(0))
    }
}
