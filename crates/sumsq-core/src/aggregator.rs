//! Result aggregation over drained slots
//!
//! Reads each slot's count and result buffer in enumeration order, keeps
//! `min(result_count, capacity)` pairs, and flags slots whose device found
//! more than it could store. Reading is side-effect free on the devices, so
//! aggregating the same drained slots twice gives the same result.

use crate::diagnostics;
use crate::error::Result;
use crate::slot::{DeviceResources, SchedulingState};
use std::time::Instant;
use sumsq_tracing::performance;

/// What one device contributed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub index: usize,
    pub name: String,
    /// Matches found, as counted by the device
    pub result_count: u32,
    /// Pairs actually stored and returned
    pub stored: usize,
    /// Tiles the device executed
    pub usage_count: u32,
    /// `result_count` exceeded the buffer capacity
    pub overflowed: bool,
}

/// Every stored pair, device by device, plus per-device reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedResult {
    pub pairs: Vec<(u64, u64)>,
    pub devices: Vec<DeviceReport>,
}

impl AggregatedResult {
    /// No pair was found on any device
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn any_overflowed(&self) -> bool {
        self.devices.iter().any(|d| d.overflowed)
    }

    /// Pairs contributed by device `index`
    pub fn pairs_of(&self, index: usize) -> &[(u64, u64)] {
        let start: usize = self.devices.iter().take_while(|d| d.index != index).map(|d| d.stored).sum();
        let len = self
            .devices
            .iter()
            .find(|d| d.index == index)
            .map_or(0, |d| d.stored);
        &self.pairs[start..start + len]
    }
}

/// Collects results from drained slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate `resources` (drained) with their matching scheduling state.
    pub fn aggregate(&self, resources: &mut [DeviceResources], scheduling: &[SchedulingState]) -> Result<AggregatedResult> {
        let mut aggregated = AggregatedResult::default();

        for (slot, device) in resources.iter_mut().enumerate() {
            let start = Instant::now();
            let readback = device.read_back()?;
            let capacity = device.capacity();
            let info = device.info();

            let stored = readback.pairs.len();
            let overflowed = readback.result_count > capacity;
            if overflowed {
                diagnostics::report_overflow(&info.name, readback.result_count, capacity);
            }
            if performance::is_enabled() {
                let bytes = std::mem::size_of::<u32>() + stored * 2 * std::mem::size_of::<u64>();
                performance::record_readback(slot, bytes, start.elapsed().as_micros() as u64);
            }

            aggregated.devices.push(DeviceReport {
                index: info.index,
                name: info.name.clone(),
                result_count: readback.result_count,
                stored,
                usage_count: scheduling.get(slot).map_or(0, |s| s.usage_count),
                overflowed,
            });
            aggregated.pairs.extend(readback.pairs);
        }

        tracing::info!(
            devices = aggregated.devices.len(),
            pairs = aggregated.pairs.len(),
            overflowed = aggregated.any_overflowed(),
            "results aggregated"
        );
        Ok(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_slots_aggregate_to_nothing() {
        let result = ResultAggregator::new().aggregate(&mut [], &[]).unwrap();
        assert!(result.is_empty());
        assert!(result.devices.is_empty());
        assert!(!result.any_overflowed());
    }

    #[test]
    fn pairs_of_slices_by_device() {
        let report = |index, stored| DeviceReport {
            index,
            name: format!("cpu:{index}"),
            result_count: stored as u32,
            stored,
            usage_count: 1,
            overflowed: false,
        };
        let result = AggregatedResult {
            pairs: vec![(0, 5), (3, 4), (4, 3)],
            devices: vec![report(0, 1), report(1, 2)],
        };
        assert_eq!(result.pairs_of(0), &[(0, 5)]);
        assert_eq!(result.pairs_of(1), &[(3, 4), (4, 3)]);
        assert!(result.pairs_of(7).is_empty());
    }
}
