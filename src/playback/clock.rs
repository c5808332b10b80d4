use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How a timed wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// The full duration passed.
    Elapsed,
    /// The token was cancelled first.
    Cancelled,
}

/// Shared, one-shot cancellation flag that wakes any thread waiting on it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cv.notify_all();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for `dur` or until cancelled, whichever comes first.
    pub fn wait_timeout(&self, dur: Duration) -> Wait {
        let (flag, cv) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cv
            .wait_timeout_while(guard, dur, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        if *guard { Wait::Cancelled } else { Wait::Elapsed }
    }
}

/// Time source for the playback dwell.
pub trait Clock: Send + Sync + 'static {
    /// Time since the clock's origin.
    fn now(&self) -> Duration;

    /// Wait `dur`, returning early when `cancel` fires.
    fn sleep(&self, dur: Duration, cancel: &CancelToken) -> Wait;
}

/// Wall clock; waits block only the playback worker thread.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, dur: Duration, cancel: &CancelToken) -> Wait {
        cancel.wait_timeout(dur)
    }
}

/// Virtual clock for deterministic tests: `sleep` advances time instantly.
///
/// Clones share the same timeline.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, dur: Duration, cancel: &CancelToken) -> Wait {
        if cancel.is_cancelled() {
            return Wait::Cancelled;
        }
        self.advance(dur);
        Wait::Elapsed
    }
}
