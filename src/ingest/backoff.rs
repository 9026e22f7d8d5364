// src/ingest/backoff.rs
//! Bounded, jittered exponential backoff for the poll loop. Waits double
//! from the floor up to the ceiling; a server-provided retry hint is used
//! as-is with ±10% jitter. Every computed wait stays inside
//! [floor, ceiling].

use std::time::Duration;

use rand::Rng;

#[derive(Debug)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// A successful cycle drops the counter back to the floor.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    /// Next exponential wait: jittered current value, then double.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.clamp(jitter(self.current, 0.8, 1.2));
        self.current = (self.current * 2).min(self.ceiling);
        wait
    }

    /// Wait derived from a server retry hint, jittered ±10%.
    pub fn hinted_wait(&self, hint: Duration) -> Duration {
        self.clamp(jitter(hint, 0.9, 1.1))
    }

    /// Pre-jitter counter value, exposed for diagnostics.
    pub fn current(&self) -> Duration {
        self.current
    }

    fn clamp(&self, d: Duration) -> Duration {
        d.max(self.floor).min(self.ceiling)
    }
}

fn jitter(base: Duration, lo: f64, hi: f64) -> Duration {
    let factor = rand::rng().random_range(lo..=hi);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_stay_within_bounds_and_counter_is_non_decreasing() {
        let floor = Duration::from_secs(5);
        let ceiling = Duration::from_secs(900);
        let mut b = Backoff::new(floor, ceiling);
        let mut prev = Duration::ZERO;
        for _ in 0..12 {
            let before = b.current();
            let wait = b.next_wait();
            assert!(wait >= floor && wait <= ceiling, "wait = {wait:?}");
            assert!(b.current() >= before);
            assert!(b.current() >= prev);
            prev = b.current();
        }
        assert_eq!(b.current(), ceiling);
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(900));
        let _ = b.next_wait();
        let _ = b.next_wait();
        b.reset();
        assert_eq!(b.current(), Duration::from_secs(5));
    }

    #[test]
    fn hinted_wait_is_jittered_around_the_hint_and_clamped() {
        let b = Backoff::new(Duration::from_secs(5), Duration::from_secs(900));
        for _ in 0..20 {
            let wait = b.hinted_wait(Duration::from_secs(60));
            assert!(wait >= Duration::from_secs(54), "wait = {wait:?}");
            assert!(wait <= Duration::from_secs(66), "wait = {wait:?}");
        }
        // A hint beyond the ceiling is clamped down to it.
        assert_eq!(
            b.hinted_wait(Duration::from_secs(10_000)),
            Duration::from_secs(900)
        );
        // A tiny hint is clamped up to the floor.
        assert_eq!(b.hinted_wait(Duration::ZERO), Duration::from_secs(5));
    }
}
