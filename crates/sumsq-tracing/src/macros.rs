//! Convenience macros for performance tracing

/// Create a [`crate::performance::PerformanceSpan`] guard.
///
/// ```text
/// perf_span!("name")
/// perf_span!("name", threshold_us)
/// ```
///
/// ```rust
/// use sumsq_tracing::perf_span;
///
/// {
///     let _span = perf_span!("dispatch_loop");
///     // ... hand tiles to devices ...
/// } // duration logged here
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, None)
    }};
    ($name:expr, $threshold_us:expr) => {{
        $crate::performance::PerformanceSpan::new($name, Some($threshold_us))
    }};
}

/// Emit a debug-level event tagged with `event = name`.
///
/// ```rust
/// use sumsq_tracing::perf_event;
///
/// perf_event!("slot_released", slot = 1, usage_count = 7);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        tracing::debug!(
            event = $name,
            $($field = $value),+
        );
    };
}

/// Run a block and return `(result, duration_in_microseconds)`.
///
/// ```rust
/// use sumsq_tracing::timed_block;
///
/// let (sum, duration_us) = timed_block!("sum", { (1..=100u64).sum::<u64>() });
/// assert_eq!(sum, 5050);
/// # let _ = duration_us;
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            operation = $name,
            duration_us = duration_us,
            duration_ms = duration_us as f64 / 1000.0,
            "timed_block_complete"
        );
        (result, duration_us)
    }};
}
