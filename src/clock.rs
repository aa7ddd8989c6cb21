use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock timestamps for rotation bookkeeping and filenames.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> i64;
}

/// A clock that uses `std::time::SystemTime`.
///
/// This is the default implementation. It follows NTP adjustments, so two
/// consecutive readings may go backwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        wall_clock_ms()
    }
}

/// A clock driven by the CPU's Time-Stamp Counter via the `quanta` crate.
///
/// It anchors to `SystemTime` once and then only moves forward, so epoch
/// filenames produced by one chronicler never sort out of creation order.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    start_wall_ms: i64,
    start_instant: quanta::Instant,
}

impl Default for QuantaClock {
    fn default() -> Self {
        let clock = quanta::Clock::new();
        let start_instant = clock.now();
        Self {
            clock,
            start_wall_ms: wall_clock_ms(),
            start_instant,
        }
    }
}

impl QuantaClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for QuantaClock {
    fn now_ms(&self) -> i64 {
        let delta = self.clock.now().duration_since(self.start_instant);
        self.start_wall_ms + delta.as_millis() as i64
    }
}

/// A clock that only moves when told to. Used to drive rotation deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
