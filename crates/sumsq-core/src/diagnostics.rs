//! Failure diagnostics
//!
//! Build failures are reported with everything the device returned (status,
//! options, full log) so the cause can be fixed without re-running under a
//! debugger. Reports go to the tracing subscriber; [`BuildReport`] renders the
//! same information for the console.

use std::fmt;
use sumsq_backends::BuildFailure;

/// Console rendering of a build failure
#[derive(Debug, Clone, Copy)]
pub struct BuildReport<'a>(pub &'a BuildFailure);

impl fmt::Display for BuildReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failure = self.0;
        writeln!(f, "Build failed on {}", failure.device)?;
        writeln!(f, "Build Status: {}", failure.status)?;
        writeln!(f, "Build Options:\t{}", failure.options)?;
        write!(f, "Build Log:\t{}", failure.log.trim_end())
    }
}

/// Log a build failure with its full log.
pub fn report_build_failure(failure: &BuildFailure) {
    tracing::error!(
        device = %failure.device,
        status = %failure.status,
        options = %failure.options,
        log = %failure.log,
        "program build failed"
    );
}

/// Log that no device could be enumerated.
pub fn report_enumeration_failure(reason: &str) {
    tracing::warn!(reason, "no devices available");
}

/// Log a launch that finished with an error status.
pub fn report_device_fault(device: &str, message: &str) {
    tracing::error!(device, message, "device fault, draining remaining devices");
}

/// Log that a device found more matches than its buffer holds.
pub fn report_overflow(device: &str, result_count: u32, capacity: u32) {
    tracing::warn!(
        device,
        result_count,
        capacity,
        dropped = result_count.saturating_sub(capacity),
        "result buffer overflowed, output truncated"
    );
}
