//! Exponential backoff bounded by a reset.

use std::time::Duration;

/// Doubling retry delays that wrap back to the minimum.
///
/// ```text
/// min=2s max=8s:  2s → 4s → 8s → 2s → 4s → 8s → …
/// ```
///
/// The sequence never ends and never exceeds `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff. `max` below `min` is raised to `min`; a zero `min` becomes one second.
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = if min.is_zero() { Duration::from_secs(1) } else { min };
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    pub fn from_secs(min_secs: u64, max_secs: u64) -> Self {
        Self::new(Duration::from_secs(min_secs), Duration::from_secs(max_secs))
    }

    /// Delay to sleep before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let doubled = self.current.saturating_mul(2);
        self.current = if doubled > self.max { self.min } else { doubled };
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}
