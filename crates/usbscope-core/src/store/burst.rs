//! Sliding-window error-burst detector.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trailing window over which errors are counted.
pub const DEFAULT_BURST_WINDOW: Duration = Duration::from_secs(5);

/// Errors inside the window needed to report a burst.
pub const DEFAULT_BURST_THRESHOLD: usize = 5;

/// Arrival times of recent error events.
///
/// Level-triggered: every error recorded while the window holds at least
/// `threshold` entries reports a burst, with no suppression between reports.
#[derive(Debug, Clone)]
pub struct ErrorBurstWindow {
    window: Duration,
    threshold: usize,
    arrivals: VecDeque<Instant>,
}

impl ErrorBurstWindow {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            arrivals: VecDeque::new(),
        }
    }

    /// Record one error seen at `now` and return the window size if it
    /// qualifies as a burst.
    pub fn record(&mut self, now: Instant) -> Option<usize> {
        self.arrivals.push_back(now);
        while let Some(&oldest) = self.arrivals.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }

        let count = self.arrivals.len();
        (count >= self.threshold).then_some(count)
    }

    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}

impl Default for ErrorBurstWindow {
    fn default() -> Self {
        Self::new(DEFAULT_BURST_WINDOW, DEFAULT_BURST_THRESHOLD)
    }
}
