//! Fixed advisory delays between catalog requests.

use std::thread;
use std::time::Duration;

/// Sleeps between steps of a sequential loop: `delay` after every step, plus
/// `burst_pause` after every `burst_size` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    pub delay: Duration,
    pub burst_size: usize,
    pub burst_pause: Duration,
}

impl Pacer {
    /// No waiting at all. Used in tests.
    pub const fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            burst_size: 0,
            burst_pause: Duration::ZERO,
        }
    }

    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            burst_size: 0,
            burst_pause: Duration::ZERO,
        }
    }

    /// 2 s pause after every 10 title searches.
    pub const fn title_search() -> Self {
        Self {
            delay: Duration::ZERO,
            burst_size: 10,
            burst_pause: Duration::from_secs(2),
        }
    }

    /// 400 ms between artist searches.
    pub const fn artist_search() -> Self {
        Self::fixed(Duration::from_millis(400))
    }

    /// 50 ms between backfill batches.
    pub const fn backfill() -> Self {
        Self::fixed(Duration::from_millis(50))
    }

    /// How long to wait after step `completed` (1-based) of `total`.
    /// Nothing is waited after the last step.
    pub fn wait_after(&self, completed: usize, total: usize) -> Duration {
        if completed >= total {
            return Duration::ZERO;
        }
        let mut wait = self.delay;
        if self.burst_size > 0 && completed % self.burst_size == 0 {
            wait += self.burst_pause;
        }
        wait
    }

    pub fn pause(&self, completed: usize, total: usize) {
        let wait = self.wait_after(completed, total);
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_search_bursts() {
        let pacer = Pacer::title_search();
        assert_eq!(pacer.wait_after(9, 25), Duration::ZERO);
        assert_eq!(pacer.wait_after(10, 25), Duration::from_secs(2));
        assert_eq!(pacer.wait_after(20, 25), Duration::from_secs(2));
        // No pause once the list is done
        assert_eq!(pacer.wait_after(20, 20), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay() {
        let pacer = Pacer::artist_search();
        assert_eq!(pacer.wait_after(1, 3), Duration::from_millis(400));
        assert_eq!(pacer.wait_after(3, 3), Duration::ZERO);
        assert_eq!(Pacer::none().wait_after(1, 3), Duration::ZERO);
    }
}
