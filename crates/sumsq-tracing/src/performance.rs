//! Performance-focused tracing utilities
//!
//! Timing guards and standard events for the scheduler's hot paths: tile
//! dispatch, device drain and buffer readback.
//!
//! ## Example
//!
//! ```rust
//! use sumsq_tracing::performance::{record_readback, PerformanceSpan};
//!
//! let span = PerformanceSpan::new("drain", Some(100));
//! // ... wait for devices ...
//! drop(span); // logs only if the drain took at least 100µs
//!
//! record_readback(0, 8192, 42);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;

static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));
// u64::MAX encodes "no global threshold".
static GLOBAL_THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Configure performance span output process-wide.
///
/// Called by [`crate::subscriber_layers`]; exposed for tests and tools that
/// compose their own subscriber.
pub fn set_enabled(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    GLOBAL_THRESHOLD_US.store(threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// Whether performance spans currently log on drop.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn global_threshold() -> Option<u64> {
    match GLOBAL_THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        value => Some(value),
    }
}

/// RAII guard that measures a span's duration and logs it on drop when it
/// reaches the threshold.
///
/// The effective threshold is the larger of the per-span value and the global
/// one configured through [`set_enabled`].
pub struct PerformanceSpan {
    threshold_us: Option<u64>,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Create a debug-level performance span.
    ///
    /// * `span_name` - Name of the operation being measured
    /// * `threshold_us` - Minimum duration in microseconds to log (None = always log)
    pub fn new(span_name: impl AsRef<str>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, span_name, threshold_us)
    }

    /// Create a performance span at the given tracing level.
    pub fn with_level(level: Level, span_name: impl AsRef<str>, threshold_us: Option<u64>) -> Self {
        let span_name = span_name.as_ref();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %span_name),
            Level::DEBUG => tracing::debug_span!("perf", name = %span_name),
            Level::INFO => tracing::info_span!("perf", name = %span_name),
            Level::WARN => tracing::warn_span!("perf", name = %span_name),
            Level::ERROR => tracing::error_span!("perf", name = %span_name),
        };

        Self {
            threshold_us,
            start_time: Instant::now(),
            span,
        }
    }

    /// Elapsed time since the span was created.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    /// Enter this span's context.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    fn should_log(&self, elapsed_us: u64) -> bool {
        if !is_enabled() {
            return false;
        }
        let threshold = match (self.threshold_us, global_threshold()) {
            (Some(local), Some(global)) => Some(local.max(global)),
            (local, global) => local.or(global),
        };
        threshold.is_none_or(|t| elapsed_us >= t)
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.should_log(elapsed_us) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Record a tile submission.
pub fn record_dispatch(slot: usize, start_x: u64, start_y: u64, usage_count: u32) {
    tracing::debug!(
        event = "tile_dispatch",
        slot,
        start_x,
        start_y,
        usage_count,
    );
}

/// Record a result buffer readback.
pub fn record_readback(slot: usize, bytes: usize, duration_us: u64) {
    let bandwidth_mbps = if duration_us > 0 {
        bytes as f64 / duration_us as f64
    } else {
        0.0
    };
    tracing::debug!(
        event = "buffer_readback",
        slot,
        bytes,
        duration_us,
        bandwidth_mbps,
    );
}

/// Record the throughput of a completed search.
pub fn record_throughput(points: u128, duration_us: u64) {
    let points_per_sec = if duration_us > 0 {
        points as f64 * 1_000_000.0 / duration_us as f64
    } else {
        0.0
    };
    tracing::debug!(
        event = "search_throughput",
        points = points as f64,
        duration_us,
        points_per_sec,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;

    #[test]
    #[serial]
    fn span_respects_local_threshold() {
        set_enabled(true, None);
        let span = PerformanceSpan::new("short", Some(u64::MAX - 1));
        assert!(!span.should_log(span.elapsed_us()));

        let span = PerformanceSpan::new("always", None);
        assert!(span.should_log(0));
    }

    #[test]
    #[serial]
    fn global_threshold_applies_when_span_has_none() {
        set_enabled(true, Some(5_000));
        let span = PerformanceSpan::new("global", None);
        assert!(!span.should_log(10));
        assert!(span.should_log(5_000));
        set_enabled(cfg!(debug_assertions), None);
    }

    #[test]
    #[serial]
    fn disabled_spans_never_log() {
        set_enabled(false, None);
        let span = PerformanceSpan::with_level(Level::INFO, "disabled", None);
        thread::sleep(Duration::from_millis(1));
        assert!(!span.should_log(span.elapsed_us()));
        set_enabled(cfg!(debug_assertions), None);
    }

    #[test]
    fn record_helpers_do_not_panic() {
        record_dispatch(1, 0, 16_383, 3);
        record_readback(0, 8192, 0);
        record_throughput(1 << 40, 1500);
    }
}
