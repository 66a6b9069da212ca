//! Logging setup and formatted summaries.

use std::time::{Duration, Instant};

use env_logger::Env;
use log::info;

use crate::metrics::{Metric, MoleculeMetrics, ProcessingMetrics};
use crate::rejection::format_count;

/// Initialises `env_logger`, defaulting to `info` unless `RUST_LOG` says otherwise.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}

/// Formats a fraction as a percentage, e.g. `0.9543` with two decimals as `95.43%`.
///
/// ```
/// use scmo_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.5, 1), "50.0%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0)
}

/// Formats a duration as `45s`, `2m 15s` or `1h 30m`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => match secs % 60 {
            0 => format!("{}m", secs / 60),
            rest => format!("{}m {rest}s", secs / 60),
        },
        _ => match (secs % 3600) / 60 {
            0 => format!("{}h", secs / 3600),
            mins => format!("{}h {mins}m", secs / 3600),
        },
    }
}

/// Formats a throughput, falling back to per-minute rates below one item per second.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} items/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} items/s", format_count(rate as u64))
    } else {
        format!("{:.1} items/min", rate * 60.0)
    }
}

/// Logs a summary of a clustering run.
#[allow(clippy::cast_precision_loss)]
pub fn log_molecule_summary(metrics: &MoleculeMetrics) {
    info!("{} summary:", MoleculeMetrics::metric_name());
    info!("  Input fragments: {}", format_count(metrics.input_fragments));
    info!("  Input reads: {}", format_count(metrics.input_reads));
    info!("  Molecules: {}", format_count(metrics.molecules));
    if metrics.molecules > 0 {
        info!("  Fragments per molecule: {:.2}", metrics.mean_fragments_per_molecule());
        let valid = metrics.valid_molecules as f64 / metrics.molecules as f64;
        info!(
            "  Valid molecules: {} ({})",
            format_count(metrics.valid_molecules),
            format_percent(valid, 2)
        );
    }
    if metrics.total_filtered() > 0 {
        info!("  Rejected molecules:");
        for (reason, count) in metrics.rejection_summary() {
            info!("    {} ({}): {}", reason.description(), reason.code(), format_count(count));
        }
    }
}

/// Times an operation and logs its throughput.
///
/// ```no_run
/// use scmo_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Clustering fragments");
/// timer.log_completion(10_000);
/// ```
#[derive(Debug)]
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    /// Starts the timer and logs the operation name.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        info!("{operation} ...");
        Self { operation: operation.to_string(), start: Instant::now() }
    }

    /// Time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Logs completion with the number of items processed.
    pub fn log_completion(&self, count: u64) {
        let duration = self.elapsed();
        info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}
