// Transport clock - Monotonic host time and the transport position derived from it
// The clock never calls back into the engine; it is only ever read, so a stale
// stop event from a superseded playback epoch cannot exist by construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic host time in seconds.
///
/// Production hosts use [`MonotonicTime`]; tests and offline render drivers
/// use [`ManualTime`] to step time explicitly.
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// Host time backed by `std::time::Instant`.
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Thread-safe f64 stored as atomic bits
#[derive(Clone)]
struct AtomicF64 {
    inner: Arc<AtomicU64>,
}

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(value.to_bits())),
        }
    }

    fn set(&self, value: f64) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

/// Manually stepped time source. Cloning yields a handle onto the same
/// underlying value, so a test can hold one handle and hand another to the
/// clock.
#[derive(Clone)]
pub struct ManualTime {
    secs: AtomicF64,
}

impl ManualTime {
    pub fn new() -> Self {
        Self {
            secs: AtomicF64::new(0.0),
        }
    }

    /// Set absolute host time
    pub fn set(&self, secs: f64) {
        self.secs.set(secs);
    }

    /// Advance host time by `delta` seconds
    pub fn advance(&self, delta: f64) {
        self.secs.set(self.secs.get() + delta);
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> f64 {
        self.secs.get()
    }
}

/// The transport clock.
///
/// Transport seconds advance 1:1 with host seconds while the clock runs;
/// tempo scaling happens in the visual mapping layer, not here. An optional
/// loop window wraps the position back into `[start, end)`.
pub struct TransportClock {
    time: Box<dyn TimeSource>,
    running: bool,
    anchor_host: f64,
    anchor_transport: f64,
    stopped_at: f64,
    loop_bounds: Option<(f64, f64)>,
}

impl TransportClock {
    pub fn new(time: Box<dyn TimeSource>) -> Self {
        Self {
            time,
            running: false,
            anchor_host: 0.0,
            anchor_transport: 0.0,
            stopped_at: 0.0,
            loop_bounds: None,
        }
    }

    /// Current host time in seconds
    pub fn host_now(&self) -> f64 {
        self.time.now()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start running at `from_transport` as of `anchor_host`.
    ///
    /// The anchor may lie slightly in the future (scheduling lookahead); until
    /// it is reached, the reported position holds at `from_transport`.
    pub fn start(&mut self, anchor_host: f64, from_transport: f64) {
        self.anchor_host = anchor_host;
        self.anchor_transport = from_transport;
        self.running = true;
    }

    /// Freeze the clock at its current position. Safe to call redundantly.
    pub fn stop(&mut self) {
        if self.running {
            self.stopped_at = self.position(self.time.now());
            self.running = false;
        }
    }

    /// Jump the frozen position (only meaningful while stopped).
    pub fn set_position(&mut self, transport: f64) {
        if !self.running {
            self.stopped_at = transport;
        }
    }

    /// Install or clear the transport-space loop window `[start, end)`.
    pub fn configure_loop(&mut self, bounds: Option<(f64, f64)>) {
        debug_assert!(
            bounds.is_none_or(|(s, e)| e > s),
            "loop end must lie after loop start"
        );
        self.loop_bounds = bounds.filter(|(s, e)| e > s);
    }

    pub fn loop_bounds(&self) -> Option<(f64, f64)> {
        self.loop_bounds
    }

    /// Transport position at host time `now`, with loop wrap applied.
    pub fn position(&self, now: f64) -> f64 {
        if !self.running {
            return self.stopped_at;
        }
        let raw = if now <= self.anchor_host {
            self.anchor_transport
        } else {
            self.anchor_transport + (now - self.anchor_host)
        };
        match self.loop_bounds {
            Some((start, end)) if raw >= end => {
                let len = end - start;
                start + (raw - start) % len
            }
            _ => raw,
        }
    }

    /// Shift the running position by `delta` transport seconds.
    ///
    /// Used by drift correction; the caller is responsible for keeping the
    /// step small enough to be inaudible.
    pub fn nudge(&mut self, delta: f64) {
        if self.running {
            self.anchor_transport += delta;
        } else {
            self.stopped_at += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_clock() -> (ManualTime, TransportClock) {
        let time = ManualTime::new();
        let clock = TransportClock::new(Box::new(time.clone()));
        (time, clock)
    }

    #[test]
    fn test_stopped_clock_holds_position() {
        let (time, mut clock) = manual_clock();
        assert_eq!(clock.position(time.now()), 0.0);
        clock.set_position(4.5);
        time.advance(10.0);
        assert_eq!(clock.position(time.now()), 4.5);
    }

    #[test]
    fn test_advances_one_to_one_with_host_time() {
        let (time, mut clock) = manual_clock();
        clock.start(1.0, 2.0);
        time.set(1.0);
        assert_eq!(clock.position(time.now()), 2.0);
        time.set(4.0);
        assert_eq!(clock.position(time.now()), 5.0);
    }

    #[test]
    fn test_future_anchor_holds_until_reached() {
        let (time, mut clock) = manual_clock();
        time.set(1.0);
        // lookahead anchor 100ms ahead
        clock.start(1.1, 6.0);
        assert_eq!(clock.position(time.now()), 6.0);
        time.set(1.05);
        assert_eq!(clock.position(time.now()), 6.0);
        time.set(1.6);
        assert!((clock.position(time.now()) - 6.5).abs() < 1e-12);
    }

    #[test]
    fn test_loop_wrap() {
        let (time, mut clock) = manual_clock();
        clock.configure_loop(Some((2.0, 6.0)));
        clock.start(0.0, 2.0);
        time.set(3.0);
        assert_eq!(clock.position(time.now()), 5.0);
        time.set(5.0);
        // raw 7.0 wraps to 3.0
        assert!((clock.position(time.now()) - 3.0).abs() < 1e-12);
        time.set(9.0);
        // raw 11.0 wraps to 3.0 again (two laps)
        assert!((clock.position(time.now()) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_stop_is_idempotent_and_freezes() {
        let (time, mut clock) = manual_clock();
        clock.start(0.0, 0.0);
        time.set(2.5);
        clock.stop();
        clock.stop();
        time.set(8.0);
        assert_eq!(clock.position(time.now()), 2.5);
    }

    #[test]
    fn test_nudge_shifts_running_position() {
        let (time, mut clock) = manual_clock();
        clock.start(0.0, 0.0);
        time.set(2.0);
        clock.nudge(0.005);
        assert!((clock.position(time.now()) - 2.005).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_loop_bounds_rejected() {
        let (_, mut clock) = manual_clock();
        clock.configure_loop(None);
        assert_eq!(clock.loop_bounds(), None);
    }
}
