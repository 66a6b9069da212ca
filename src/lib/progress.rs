//! Interval progress logging.
//!
//! [`ProgressTracker`] counts items and logs one `info!` line each time the count crosses a
//! multiple of its interval. Callers may pass the genomic location they have reached so the
//! log shows how far through the input the run is.

use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

use crate::rejection::format_count;

/// Default number of items between progress messages.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Thread-safe progress counter.
///
/// # Example
/// ```
/// use scmo_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Clustered fragments").with_interval(100);
/// for _ in 0..250 {
///     tracker.record(1, Some("chr1:1000"));  // logs at 100 and 200
/// }
/// tracker.log_final();  // logs "Clustered fragments 250 (complete)"
/// ```
#[derive(Debug)]
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Creates a tracker with the default interval.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: DEFAULT_PROGRESS_INTERVAL,
            message: message.into(),
            count: AtomicU64::new(0),
        }
    }

    /// Sets the logging interval. Zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Adds `additional` items, logging every interval boundary crossed.
    ///
    /// Returns `true` when the new count is exactly on a boundary.
    pub fn record(&self, additional: u64, location: Option<&str>) -> bool {
        let previous = self.count.fetch_add(additional, Ordering::Relaxed);
        let current = previous + additional;
        for boundary in (previous / self.interval + 1)..=(current / self.interval) {
            let milestone = format_count(boundary * self.interval);
            match location {
                Some(location) => info!("{} {milestone} (at {location})", self.message),
                None => info!("{} {milestone}", self.message),
            }
        }
        current > 0 && current % self.interval == 0
    }

    /// Logs the final count unless it was logged already as a boundary.
    pub fn log_final(&self) {
        let count = self.count();
        if count > 0 && count % self.interval != 0 {
            info!("{} {} (complete)", self.message, format_count(count));
        }
    }

    /// Items counted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
