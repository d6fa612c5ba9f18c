//! Exponential reconnect backoff.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Backoff
// ============================================================================

/// Doubling delay between reconnect attempts, bounded by a cap.
///
/// The first delay after a reset is the floor.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `floor` and never exceeding `cap`.
    #[must_use]
    pub fn new(floor: Duration, cap: Duration) -> Self {
        let cap = cap.max(floor);
        Self {
            floor,
            cap,
            current: floor,
        }
    }

    /// Returns the delay for this failure and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        delay
    }

    /// Returns the delay the next failure will use.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Starts over from the floor.
    #[inline]
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doubles_then_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_millis(400));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_cap_below_floor_clamps() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn delays_increase_until_cap(floor_ms in 1u64..5_000, cap_factor in 1u64..64, steps in 1usize..40) {
            let floor = Duration::from_millis(floor_ms);
            let cap = Duration::from_millis(floor_ms * cap_factor);
            let mut backoff = Backoff::new(floor, cap);

            let mut previous = backoff.next_delay();
            prop_assert_eq!(previous, floor);

            for _ in 0..steps {
                let delay = backoff.next_delay();
                prop_assert!(delay <= cap);
                prop_assert!(delay > previous || delay == cap);
                previous = delay;
            }
        }
    }
}
