//! Monotonic time sources and fixed-rate scheduling
//!
//! Pacing decisions are pure functions of a [`Clock`] reading, so replay,
//! simulation and the analysis cadence can be driven by a [`ManualClock`] in
//! tests instead of wall time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;
}

/// Clock backed by [`std::time::Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute reading
    pub fn set(&self, at: Duration) {
        self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Counts how many samples are due at a nominal rate
///
/// The first call anchors the schedule; every later call returns the samples
/// that should have been emitted since then minus those already handed out.
#[derive(Debug, Clone)]
pub struct SamplePacer {
    rate_hz: f64,
    started_at: Option<Duration>,
    emitted: u64,
}

impl SamplePacer {
    pub fn new(rate_hz: f64) -> Self {
        SamplePacer {
            rate_hz,
            started_at: None,
            emitted: 0,
        }
    }

    /// Samples to emit now to keep up with the nominal rate
    pub fn due(&mut self, now: Duration) -> usize {
        let started_at = *self.started_at.get_or_insert(now);
        let elapsed = now.saturating_sub(started_at).as_secs_f64();
        // Small epsilon so exact multiples of the period are not lost to rounding
        let target = (elapsed * self.rate_hz + 1e-9).floor() as u64;

        let due = target.saturating_sub(self.emitted);
        self.emitted += due;
        due as usize
    }

    /// Samples handed out so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Forget the anchor, e.g. after a pause
    pub fn restart(&mut self) {
        self.started_at = None;
        self.emitted = 0;
    }
}

/// Fires once per period
#[derive(Debug, Clone)]
pub struct PeriodicTrigger {
    period: Duration,
    last_fired: Option<Duration>,
}

impl PeriodicTrigger {
    pub fn new(period: Duration) -> Self {
        PeriodicTrigger {
            period,
            last_fired: None,
        }
    }

    /// True on the first call and then whenever a full period has passed
    pub fn fire(&mut self, now: Duration) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_sub(last) < self.period => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Measures an event rate over fixed windows of clock time
///
/// Events are added as they arrive; once a full window has elapsed the count
/// is turned into a rate and a new window starts.
#[derive(Debug, Clone)]
pub struct RateMeter {
    window: Duration,
    started_at: Option<Duration>,
    count: u64,
    last_rate: Option<f64>,
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        RateMeter {
            window,
            started_at: None,
            count: 0,
            last_rate: None,
        }
    }

    /// Add `events` seen at `now`; returns the rate in Hz when a window closes
    pub fn record(&mut self, now: Duration, events: u64) -> Option<f64> {
        let started_at = *self.started_at.get_or_insert(now);
        self.count += events;

        let elapsed = now.saturating_sub(started_at);
        if elapsed.is_zero() || elapsed < self.window {
            return None;
        }

        let rate = self.count as f64 / elapsed.as_secs_f64();
        self.started_at = Some(now);
        self.count = 0;
        self.last_rate = Some(rate);
        Some(rate)
    }

    /// Rate of the most recently closed window
    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));

        clock.set(Duration::from_secs(3));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > first);
    }

    #[test]
    fn test_pacer_tracks_nominal_rate() {
        let clock = ManualClock::new();
        let mut pacer = SamplePacer::new(100.0);

        assert_eq!(pacer.due(clock.now()), 0);

        clock.advance(Duration::from_millis(20));
        assert_eq!(pacer.due(clock.now()), 2);

        // A late tick catches up in one go
        clock.advance(Duration::from_millis(135));
        assert_eq!(pacer.due(clock.now()), 13);

        // Nothing new within the same sample period
        clock.advance(Duration::from_millis(4));
        assert_eq!(pacer.due(clock.now()), 0);

        assert_eq!(pacer.emitted(), 15);
    }

    #[test]
    fn test_pacer_restart() {
        let clock = ManualClock::new();
        let mut pacer = SamplePacer::new(50.0);
        pacer.due(clock.now());
        clock.advance(Duration::from_secs(1));
        assert_eq!(pacer.due(clock.now()), 50);

        pacer.restart();
        assert_eq!(pacer.due(clock.now()), 0);
        clock.advance(Duration::from_millis(100));
        assert_eq!(pacer.due(clock.now()), 5);
    }

    #[test]
    fn test_periodic_trigger() {
        let clock = ManualClock::new();
        let mut trigger = PeriodicTrigger::new(Duration::from_millis(500));

        assert!(trigger.fire(clock.now()));
        clock.advance(Duration::from_millis(300));
        assert!(!trigger.fire(clock.now()));
        clock.advance(Duration::from_millis(200));
        assert!(trigger.fire(clock.now()));
        clock.advance(Duration::from_millis(499));
        assert!(!trigger.fire(clock.now()));
    }

    #[test]
    fn test_rate_meter_windows() {
        let clock = ManualClock::new();
        let mut meter = RateMeter::new(Duration::from_secs(1));

        // Anchors the window; events at the anchor still count
        assert_eq!(meter.record(clock.now(), 0), None);
        clock.advance(Duration::from_millis(500));
        assert_eq!(meter.record(clock.now(), 48), None);
        clock.advance(Duration::from_millis(500));
        assert_eq!(meter.record(clock.now(), 50), Some(98.0));
        assert_eq!(meter.last_rate(), Some(98.0));

        // A late reading spans a longer window
        clock.advance(Duration::from_secs(2));
        assert_eq!(meter.record(clock.now(), 100), Some(50.0));

        // A stalled device reads as zero
        clock.advance(Duration::from_secs(1));
        assert_eq!(meter.record(clock.now(), 0), Some(0.0));
    }
}
