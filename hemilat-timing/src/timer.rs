use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source shared by every component of a session.
///
/// `now()` is the elapsed time since the clock's origin. Implementations must
/// never go backwards and must not follow wall-clock adjustments.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);

    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }

    /// Sleeps until `target`, returning immediately if it has already passed.
    fn sleep_until(&self, target: Duration) {
        let now = self.now();
        if target > now {
            self.sleep(target - now);
        }
    }
}

/// Process clock backed by `Instant`, with an OS-level precise sleep.
#[derive(Debug, Clone)]
pub struct HighPrecisionClock {
    origin: Instant,
}

impl HighPrecisionClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        self.spin_sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // EINTR leaves the unslept part in `rem`.
        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != libc::EINTR {
                break;
            }
            req = rem;
        }
    }

    /// Coarse OS sleep followed by a short spin for the last stretch.
    #[cfg(not(target_os = "linux"))]
    fn spin_sleep(&self, duration: Duration) {
        const SPIN_WINDOW: Duration = Duration::from_micros(200);

        let target = Instant::now() + duration;
        if duration > SPIN_WINDOW {
            std::thread::sleep(duration - SPIN_WINDOW);
        }
        while Instant::now() < target {
            std::hint::spin_loop();
        }
    }
}

impl Default for HighPrecisionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HighPrecisionClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

/// Deterministic clock for tests and simulations: `sleep` advances time
/// instead of blocking. Clones share the same time line.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(t: Duration) -> Self {
        let clock = Self::new();
        clock.set(t);
        clock
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Moves the clock forward to `t`. Earlier values are ignored so time
    /// stays monotonic.
    pub fn set(&self, t: Duration) {
        self.nanos.fetch_max(t.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

/// Rolling window of presented frame durations, used to report display
/// timing quality at the end of a session.
#[derive(Debug, Clone)]
pub struct FrameTimes {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl FrameTimes {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, d: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn calibration_stats(&self) -> CalibrationStats {
        if self.samples.is_empty() {
            return CalibrationStats {
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
            };
        }
        let times: Vec<f64> = self.samples.iter().map(|d| d.as_nanos() as f64).collect();
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl Default for FrameTimes {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(250));

        let shared = clock.clone();
        shared.sleep_until(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::starting_at(Duration::from_secs(3));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(3));
        clock.sleep_until(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn high_precision_clock_is_monotonic() {
        let clock = HighPrecisionClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(2));
        let b = clock.now();
        assert!(b >= a + Duration::from_millis(2));
    }

    #[test]
    fn frame_stats_over_window() {
        let mut frames = FrameTimes::new(3);
        for ms in [10, 20, 30, 40] {
            frames.record(Duration::from_millis(ms));
        }
        assert_eq!(frames.len(), 3);
        let stats = frames.calibration_stats();
        assert_eq!(stats.min_frame_time_ns, 20_000_000.0);
        assert_eq!(stats.max_frame_time_ns, 40_000_000.0);
        assert!((stats.average_frame_time_ns - 30_000_000.0).abs() < 1e-3);
        assert!((stats.effective_fps - 1e9 / 30_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn empty_frame_stats_are_zero() {
        let stats = FrameTimes::default().calibration_stats();
        assert_eq!(stats.effective_fps, 0.0);
        assert_eq!(stats.jitter_ns, 0.0);
    }
}
