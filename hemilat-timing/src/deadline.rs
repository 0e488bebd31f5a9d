use crate::timer::Clock;
use std::time::Duration;

/// Countdown against a fixed point on a [`Clock`].
///
/// Purely cooperative: nothing fires on expiry, the owning loop polls it.
#[derive(Debug, Clone)]
pub struct Deadline<C: Clock> {
    clock: C,
    started: Duration,
    target: Duration,
}

impl<C: Clock> Deadline<C> {
    pub fn new(clock: C, duration: Duration) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            target: started + duration,
        }
    }

    /// Re-arms the deadline `duration` from now.
    pub fn restart(&mut self, duration: Duration) {
        self.started = self.clock.now();
        self.target = self.started + duration;
    }

    pub fn started(&self) -> Duration {
        self.started
    }

    pub fn target(&self) -> Duration {
        self.target
    }

    /// Signed seconds until the target; negative once expired.
    pub fn remaining(&self) -> f64 {
        let now = self.clock.now();
        if now <= self.target {
            (self.target - now).as_secs_f64()
        } else {
            -(now - self.target).as_secs_f64()
        }
    }

    pub fn expired(&self) -> bool {
        self.clock.now() >= self.target
    }

    /// Time left before the target, zero once expired.
    pub fn time_left(&self) -> Duration {
        self.target.saturating_sub(self.clock.now())
    }

    /// Time elapsed past the target, zero while still running.
    pub fn overrun(&self) -> Duration {
        self.clock.now().saturating_sub(self.target)
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
