//! Run orchestration: space → tiles → dispatch → drain → aggregate

use crate::aggregator::{AggregatedResult, ResultAggregator};
use crate::config::{SchedulerConfig, SearchConfig};
use crate::diagnostics;
use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::error::{Result, SearchError};
use crate::slot::DeviceResources;
use crate::space::SearchSpace;
use crate::tile::{TileGeometry, TilePartitioner};
use std::time::{Duration, Instant};
use sumsq_backends::{list_devices, BackendType, Device, DeviceInfo, DeviceOptions, KernelProgram};
use sumsq_tracing::performance;

/// Everything a finished run reports
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub space: SearchSpace,
    pub devices: Vec<DeviceInfo>,
    pub tiles: u64,
    pub stats: DispatchStats,
    /// Dispatch plus drain
    pub elapsed: Duration,
    pub result: AggregatedResult,
}

impl SearchReport {
    pub fn found(&self) -> bool {
        !self.result.is_empty()
    }
}

/// Enumerate `backend` and run the configured search on its devices.
#[tracing::instrument(skip(config, options), fields(x = config.x, y = config.y))]
pub fn run(config: &SearchConfig, backend: BackendType, options: &DeviceOptions) -> Result<SearchReport> {
    let devices = list_devices(backend, options).map_err(SearchError::from)?;
    run_search(config, devices, &KernelProgram::default())
}

/// Run the configured search on `devices`, building `program` on each.
///
/// Devices are used in the given order; their position is their slot index.
pub fn run_search(
    config: &SearchConfig,
    devices: Vec<Box<dyn Device>>,
    program: &KernelProgram,
) -> Result<SearchReport> {
    let space = SearchSpace::new(config.x, config.y)?;
    let scheduler = &config.scheduler;
    let partitioner = partition(&space, scheduler)?;

    if devices.is_empty() {
        let reason = "device enumeration returned no devices";
        diagnostics::report_enumeration_failure(reason);
        return Err(SearchError::NoDevices(reason.into()));
    }

    let infos: Vec<DeviceInfo> = devices.iter().map(|d| d.info().clone()).collect();
    tracing::info!(
        n = space.n(),
        max_xy = space.max_xy,
        devices = infos.len(),
        tiles = partitioner.len(),
        "search configured"
    );

    let resources = prepare_slots(devices, program, scheduler.capacity)?;
    let mut dispatcher = Dispatcher::new(resources, scheduler.wait_strategy());

    let start = Instant::now();
    let stats = dispatcher.dispatch(&space, &partitioner)?;
    dispatcher.drain()?;
    let elapsed = start.elapsed();

    if performance::is_enabled() {
        let side = space.max_xy as u128 + 1;
        performance::record_throughput(side * side, elapsed.as_micros() as u64);
    }

    let (resources, scheduling) = dispatcher.parts_mut();
    let result = ResultAggregator::new().aggregate(resources, scheduling)?;

    tracing::info!(
        elapsed_us = elapsed.as_micros() as u64,
        tiles = stats.tiles_dispatched,
        peak_in_flight = stats.peak_in_flight,
        pairs = result.pairs.len(),
        "search finished"
    );

    Ok(SearchReport {
        space,
        devices: infos,
        tiles: partitioner.len(),
        stats,
        elapsed,
        result,
    })
}

fn partition(space: &SearchSpace, scheduler: &SchedulerConfig) -> Result<TilePartitioner> {
    if scheduler.capacity == 0 {
        return Err(SearchError::invalid_input("capacity must be positive"));
    }
    let geometry = TileGeometry::new(scheduler.kernel_span, scheduler.grid_width)?;
    Ok(TilePartitioner::new(space.max_xy, geometry))
}

/// Prepare every device; any build failure aborts the run.
fn prepare_slots(
    devices: Vec<Box<dyn Device>>,
    program: &KernelProgram,
    capacity: u32,
) -> Result<Vec<DeviceResources>> {
    let mut slots = Vec::with_capacity(devices.len());
    for device in devices {
        let mut slot = DeviceResources::new(device);
        if let Err(err) = slot.prepare(program, capacity) {
            if let SearchError::Build(failure) = &err {
                diagnostics::report_build_failure(failure);
            }
            return Err(err);
        }
        slots.push(slot);
    }
    Ok(slots)
}
