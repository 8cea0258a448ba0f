//! Tile dispatcher
//!
//! Hands tiles to whichever device is free, in partitioner order. Faster
//! devices free up sooner and therefore take more tiles. A single thread
//! drives all scheduling; devices run asynchronously and report completion
//! through their handles (polled) or through a shared token channel
//! (signalled).
//!
//! ```text
//! for tile in partitioner:
//!     slot = select_free_device()   // blocks only here
//!     mark busy, usage += 1
//!     enqueue + flush               // never waits for execution
//! drain every slot                  // blocking finish
//! ```

use crate::error::{Result, SearchError};
use crate::slot::{DeviceResources, SchedulingState};
use crate::space::SearchSpace;
use crate::tile::TilePartitioner;
use crossbeam_channel::{Receiver, Sender};
use std::thread;
use std::time::Duration;
use sumsq_backends::{completion_channel, CompletionNotifier};
use sumsq_tracing::performance;

/// How `select_free_device` waits when every slot is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Re-scan completion statuses, sleeping `interval` between scans
    Poll { interval: Duration },
    /// Block until some device reports a finished launch
    #[default]
    Signal,
}

/// Failure observed on a slot's latest launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFault {
    pub slot: usize,
    pub message: String,
}

/// Scheduling state of every slot plus the free-slot signal
#[derive(Debug)]
pub struct DispatchState {
    slots: Vec<SchedulingState>,
    signal_tx: Sender<usize>,
    signal_rx: Receiver<usize>,
}

impl DispatchState {
    pub fn new(slot_count: usize) -> Self {
        let (signal_tx, signal_rx) = completion_channel();
        Self {
            slots: vec![SchedulingState::default(); slot_count],
            signal_tx,
            signal_rx,
        }
    }

    pub fn slots(&self) -> &[SchedulingState] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Notifier that wakes a signal-mode wait when `slot` finishes
    pub fn notifier(&self, slot: usize) -> CompletionNotifier {
        CompletionNotifier::new(slot, self.signal_tx.clone())
    }

    pub fn mark_busy(&mut self, slot: usize, completion: sumsq_backends::CompletionHandle) {
        self.slots[slot].mark_busy(completion);
    }

    /// Number of slots currently executing a tile
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| !s.free).count()
    }

    /// Free every slot whose launch finished; the first failure wins.
    pub fn refresh(&mut self) -> std::result::Result<(), SlotFault> {
        for (slot, state) in self.slots.iter_mut().enumerate() {
            if state.free {
                continue;
            }
            let fault = state.refresh();
            if state.free {
                sumsq_tracing::perf_event!("slot_released", slot = slot, usage_count = state.usage_count);
            }
            if let Some(message) = fault {
                return Err(SlotFault { slot, message });
            }
        }
        Ok(())
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.free)
    }

    /// Index of the first free slot, waiting for one if necessary.
    ///
    /// A slot already marked free wins without querying any completion.
    /// Waits without a timeout. Must not be called with no slots.
    pub fn select_free_device(&mut self, strategy: WaitStrategy) -> std::result::Result<usize, SlotFault> {
        if let Some(slot) = self.first_free() {
            return Ok(slot);
        }
        loop {
            self.refresh()?;
            if let Some(slot) = self.first_free() {
                return Ok(slot);
            }

            match strategy {
                WaitStrategy::Poll { interval } => thread::sleep(interval),
                WaitStrategy::Signal => {
                    // We hold a sender, so the channel never disconnects. Stale
                    // tokens only cost one extra scan.
                    let _ = self.signal_rx.recv();
                }
            }
        }
    }
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub tiles_dispatched: u64,
    pub peak_in_flight: usize,
}

/// Owns every slot for the duration of a run.
#[derive(Debug)]
pub struct Dispatcher {
    resources: Vec<DeviceResources>,
    state: DispatchState,
    strategy: WaitStrategy,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Take ownership of prepared slots.
    pub fn new(resources: Vec<DeviceResources>, strategy: WaitStrategy) -> Self {
        let state = DispatchState::new(resources.len());
        Self {
            resources,
            state,
            strategy,
            stats: DispatchStats::default(),
        }
    }

    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn resources(&self) -> &[DeviceResources] {
        &self.resources
    }

    pub fn scheduling(&self) -> &[SchedulingState] {
        self.state.slots()
    }

    /// Slots split into their two halves, for aggregation
    pub fn parts_mut(&mut self) -> (&mut [DeviceResources], &[SchedulingState]) {
        (self.resources.as_mut_slice(), self.state.slots())
    }

    /// Hand every tile to a free device.
    ///
    /// Returns once the last tile is submitted; call [`Dispatcher::drain`]
    /// before reading results. A failed launch stops dispatch, drains every
    /// device and is returned as `SearchError::DeviceFault`.
    pub fn dispatch(&mut self, space: &SearchSpace, partitioner: &TilePartitioner) -> Result<DispatchStats> {
        if self.resources.is_empty() {
            return Err(SearchError::NoDevices("dispatcher has no slots".into()));
        }

        let geometry = partitioner.geometry();
        let _span = sumsq_tracing::perf_span!("dispatch_tiles");
        tracing::info!(
            tiles = partitioner.len(),
            devices = self.resources.len(),
            strategy = ?self.strategy,
            "dispatch started"
        );

        for tile in partitioner.tiles() {
            let slot = match self.state.select_free_device(self.strategy) {
                Ok(slot) => slot,
                Err(fault) => return Err(self.abort_on_fault(fault)),
            };

            let notifier = match self.strategy {
                WaitStrategy::Signal => Some(self.state.notifier(slot)),
                WaitStrategy::Poll { .. } => None,
            };
            let handle = match self.resources[slot].launch(&tile, space, &geometry, notifier) {
                Ok(handle) => handle,
                Err(err) => {
                    self.drain_after_failure();
                    return Err(err);
                }
            };
            self.state.mark_busy(slot, handle);

            let usage_count = self.state.slots()[slot].usage_count;
            self.stats.tiles_dispatched += 1;
            self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.state.in_flight());

            tracing::debug!(
                slot,
                start_x = tile.start_x,
                start_y = tile.start_y,
                usage_count,
                "tile dispatched"
            );
            if performance::is_enabled() {
                performance::record_dispatch(slot, tile.start_x, tile.start_y, usage_count);
            }
        }

        Ok(self.stats)
    }

    /// Block until every device has finished its queue.
    ///
    /// Every device is finished even when an earlier one fails; the first
    /// failure is returned. A launch that failed after its tile was handed
    /// over is reported here.
    pub fn drain(&mut self) -> Result<()> {
        let _span = sumsq_tracing::perf_span!("drain_devices");
        let mut first_error = None;
        for resources in &mut self.resources {
            let (drained, duration_us) = sumsq_tracing::timed_block!("drain_device", { resources.drain() });
            tracing::trace!(device = %resources.info().name, duration_us, "device drain returned");
            if let Err(err) = drained {
                tracing::error!(device = %resources.info().name, error = %err, "drain failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        tracing::debug!(devices = self.resources.len(), "all devices drained");

        self.state.refresh().map_err(|fault| self.fault_error(fault))
    }

    fn abort_on_fault(&mut self, fault: SlotFault) -> SearchError {
        self.drain_after_failure();
        self.fault_error(fault)
    }

    fn drain_after_failure(&mut self) {
        for resources in &mut self.resources {
            if let Err(err) = resources.drain() {
                tracing::error!(device = %resources.info().name, error = %err, "drain after failure failed");
            }
        }
    }

    fn fault_error(&self, fault: SlotFault) -> SearchError {
        let device = self
            .resources
            .get(fault.slot)
            .map(|r| r.info().name.clone())
            .unwrap_or_else(|| format!("slot {}", fault.slot));
        crate::diagnostics::report_device_fault(&device, &fault.message);
        SearchError::DeviceFault {
            device,
            message: fault.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use sumsq_backends::{CompletionHandle, CompletionSignal};

    fn busy(state: &mut DispatchState, slot: usize, notify: bool) -> Arc<CompletionSignal> {
        let signal = CompletionSignal::new(notify.then(|| state.notifier(slot)));
        state.mark_busy(slot, CompletionHandle::new(signal.clone()));
        signal
    }

    #[test]
    fn first_free_slot_wins() {
        let mut state = DispatchState::new(3);
        assert_eq!(state.select_free_device(WaitStrategy::Signal), Ok(0));

        busy(&mut state, 0, false);
        assert_eq!(state.select_free_device(WaitStrategy::Signal), Ok(1));
        assert_eq!(state.in_flight(), 1);
    }

    #[test]
    fn free_slot_beats_finished_busy_slot() {
        let mut state = DispatchState::new(2);
        let finished = busy(&mut state, 0, true);
        finished.complete();

        assert_eq!(state.select_free_device(WaitStrategy::Signal), Ok(1));
        assert!(!state.slots()[0].free);

        // Once nothing is marked free, the finished slot is picked up.
        busy(&mut state, 1, true);
        assert_eq!(state.select_free_device(WaitStrategy::Signal), Ok(0));
    }

    #[test]
    fn poll_waits_for_completion() {
        let mut state = DispatchState::new(2);
        let first = busy(&mut state, 0, false);
        let second = busy(&mut state, 1, false);

        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            second.complete();
            first
        });

        let start = Instant::now();
        let slot = state
            .select_free_device(WaitStrategy::Poll {
                interval: Duration::from_millis(1),
            })
            .unwrap();
        assert_eq!(slot, 1);
        assert!(start.elapsed() >= Duration::from_millis(15));
        drop(finisher.join().unwrap());
    }

    #[test]
    fn signal_wakes_on_notification() {
        let mut state = DispatchState::new(2);
        let first = busy(&mut state, 0, true);
        let _second = busy(&mut state, 1, true);

        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            first.complete();
        });

        assert_eq!(state.select_free_device(WaitStrategy::Signal), Ok(0));
        finisher.join().unwrap();
    }

    #[test]
    fn failed_launch_surfaces_as_fault() {
        let mut state = DispatchState::new(1);
        let signal = busy(&mut state, 0, true);
        signal.fail("out of resources");

        assert_eq!(
            state.select_free_device(WaitStrategy::Signal),
            Err(SlotFault {
                slot: 0,
                message: "out of resources".into()
            })
        );
    }

    #[test]
    fn empty_dispatcher_reports_no_devices() {
        let space = SearchSpace::new(3, 4).unwrap();
        let partitioner = TilePartitioner::new(space.max_xy, crate::tile::TileGeometry::new(2, 2).unwrap());
        let mut dispatcher = Dispatcher::new(Vec::new(), WaitStrategy::default());
        assert!(matches!(
            dispatcher.dispatch(&space, &partitioner),
            Err(SearchError::NoDevices(_))
        ));
        assert_eq!(dispatcher.stats().tiles_dispatched, 0);
    }
}
