//! Millisecond tick clock with wraparound-safe deadline arithmetic
//!
//! Ticks are a free-running `u32` millisecond counter that wraps roughly
//! every 49.7 days. Deadlines are compared with [`ticks_diff`], which stays
//! correct across the wrap as long as the two instants are less than
//! `i32::MAX` milliseconds apart.

use std::time::Duration;

use tokio::time::Instant;

/// A point on the wrapping millisecond counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticks(pub u32);

impl Ticks {
    pub fn add(self, delta: Duration) -> Ticks {
        ticks_add(self, delta)
    }

    /// Milliseconds from `self` until `deadline`; negative once it has passed
    pub fn until(self, deadline: Ticks) -> i32 {
        ticks_diff(deadline, self)
    }

    /// Whether `deadline` has been reached at `self`
    pub fn reached(self, deadline: Ticks) -> bool {
        ticks_diff(deadline, self) <= 0
    }
}

/// Offset a tick value, wrapping on overflow
pub fn ticks_add(base: Ticks, delta: Duration) -> Ticks {
    let ms = u32::try_from(delta.as_millis()).unwrap_or(u32::MAX);
    Ticks(base.0.wrapping_add(ms))
}

/// Signed difference `a - b` in milliseconds, wraparound-safe
pub fn ticks_diff(a: Ticks, b: Ticks) -> i32 {
    a.0.wrapping_sub(b.0) as i32
}

/// Source of monotonic ticks
pub trait Clock: Send + Sync {
    fn now(&self) -> Ticks;
}

/// Clock backed by `tokio::time::Instant`, so paused test time drives it too
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    offset: u32,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Start the counter at `offset` instead of zero
    pub fn with_offset(offset: u32) -> Self {
        Self {
            origin: Instant::now(),
            offset,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Ticks {
        // Truncation is the wrap.
        let elapsed = self.origin.elapsed().as_millis() as u32;
        Ticks(self.offset.wrapping_add(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_without_wrap() {
        assert_eq!(ticks_diff(Ticks(1500), Ticks(1000)), 500);
        assert_eq!(ticks_diff(Ticks(1000), Ticks(1500)), -500);
    }

    #[test]
    fn test_diff_across_wrap() {
        let before = Ticks(u32::MAX - 9);
        let after = ticks_add(before, Duration::from_millis(20));
        assert_eq!(after, Ticks(10));
        assert_eq!(ticks_diff(after, before), 20);
        assert_eq!(ticks_diff(before, after), -20);
    }

    #[test]
    fn test_reached() {
        let deadline = Ticks(u32::MAX).add(Duration::from_millis(5));
        assert!(!Ticks(u32::MAX).reached(deadline));
        assert!(Ticks(4).reached(deadline));
        assert!(Ticks(10).reached(deadline));
        assert_eq!(Ticks(0).until(deadline), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_tokio_time() {
        let clock = MonotonicClock::with_offset(u32::MAX - 1);
        let start = clock.now();
        tokio::time::sleep(Duration::from_millis(3)).await;
        assert_eq!(ticks_diff(clock.now(), start), 3);
        assert_eq!(clock.now(), Ticks(1));
    }
}
