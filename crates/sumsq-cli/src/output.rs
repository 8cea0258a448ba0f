//! Console rendering of a run

use std::fmt::Write;
use std::time::Duration;
use sumsq_backends::DeviceInfo;
use sumsq_core::SearchReport;

pub fn render_inputs(x: u64, y: u64) -> String {
    format!("Use values: x = {x} y = {y}")
}

pub fn render_devices(devices: &[DeviceInfo]) -> String {
    let mut out = String::from("Available devices:");
    for device in devices {
        let _ = write!(out, "\n{device}");
    }
    out
}

pub fn render_elapsed(elapsed: Duration) -> String {
    let micros = elapsed.as_micros();
    format!("Elapsed = {} ms {} microsec.", micros / 1000, micros % 1000)
}

/// Per-device counts followed by that device's pairs
pub fn render_results(report: &SearchReport) -> String {
    let mut out = String::new();
    for device in &report.result.devices {
        let _ = write!(
            out,
            "device = {} result count = {} usage count = {}",
            device.index, device.result_count, device.usage_count
        );
        if device.overflowed {
            let _ = write!(out, " (overflowed, {} stored)", device.stored);
        }
        out.push('\n');
        for (x, y) in report.result.pairs_of(device.index) {
            let _ = writeln!(out, "x = {x} y = {y}");
        }
    }
    if !report.found() {
        out.push_str("x and y not found\n");
    }
    out
}
