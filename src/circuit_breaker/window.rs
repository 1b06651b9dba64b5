use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a completed call, as seen by the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Time-bounded sequence of call outcomes used for error-rate tripping.
///
/// Samples are appended in timestamp order, so pruning only ever pops from the
/// front. The failure count is kept alongside so the rate is O(1) after pruning.
#[derive(Debug)]
pub struct RollingWindow {
    span: Duration,
    samples: VecDeque<(Instant, Outcome)>,
    failures: usize,
}

impl RollingWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            samples: VecDeque::new(),
            failures: 0,
        }
    }

    /// Append a sample, pruning anything that has aged out
    pub fn record(&mut self, now: Instant, outcome: Outcome) {
        self.prune(now);
        if outcome == Outcome::Failure {
            self.failures += 1;
        }
        self.samples.push_back((now, outcome));
    }

    /// Drop samples older than the window span
    pub fn prune(&mut self, now: Instant) {
        while let Some(&(at, outcome)) = self.samples.front() {
            if now.saturating_duration_since(at) <= self.span {
                break;
            }
            self.samples.pop_front();
            if outcome == Outcome::Failure {
                self.failures -= 1;
            }
        }
    }

    /// Failure fraction over the window, or 0.0 with fewer than `min_samples`
    pub fn error_rate(&mut self, now: Instant, min_samples: u32) -> f64 {
        self.prune(now);
        let total = self.samples.len();
        if total == 0 || total < min_samples as usize {
            return 0.0;
        }
        self.failures as f64 / total as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate_below_min_samples_is_zero() {
        let mut window = RollingWindow::new(Duration::from_secs(10));
        let now = Instant::now();
        window.record(now, Outcome::Failure);
        window.record(now, Outcome::Failure);

        assert_eq!(window.error_rate(now, 3), 0.0);
        assert_eq!(window.error_rate(now, 2), 1.0);
    }

    #[test]
    fn test_error_rate_mixed_outcomes() {
        let mut window = RollingWindow::new(Duration::from_secs(10));
        let now = Instant::now();
        window.record(now, Outcome::Success);
        window.record(now, Outcome::Failure);
        window.record(now, Outcome::Success);
        window.record(now, Outcome::Failure);

        assert_eq!(window.len(), 4);
        assert_eq!(window.failures(), 2);
        assert_eq!(window.error_rate(now, 0), 0.5);
    }

    #[test]
    fn test_empty_window_rate_is_zero() {
        let mut window = RollingWindow::new(Duration::from_secs(10));
        assert!(window.is_empty());
        assert_eq!(window.error_rate(Instant::now(), 0), 0.0);
    }

    #[test]
    fn test_old_samples_are_pruned() {
        let mut window = RollingWindow::new(Duration::from_secs(10));
        let start = Instant::now();
        window.record(start, Outcome::Failure);
        window.record(start + Duration::from_secs(5), Outcome::Failure);
        window.record(start + Duration::from_secs(8), Outcome::Success);

        // First failure is 11s old, the rest are within span
        let later = start + Duration::from_secs(11);
        assert!((window.error_rate(later, 0) - 0.5).abs() < f64::EPSILON);
        assert_eq!(window.len(), 2);
        assert_eq!(window.failures(), 1);

        // Everything aged out
        let much_later = start + Duration::from_secs(30);
        window.prune(much_later);
        assert!(window.is_empty());
        assert_eq!(window.failures(), 0);
    }

    #[test]
    fn test_clear_resets_counts() {
        let mut window = RollingWindow::new(Duration::from_secs(10));
        let now = Instant::now();
        window.record(now, Outcome::Failure);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.failures(), 0);
    }
}
