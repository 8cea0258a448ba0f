//! Per-device slots
//!
//! A slot is split in two halves addressed by the same index:
//!
//! - [`DeviceResources`]: what the device can do (build, buffers, enqueue)
//!   and the lifecycle phase of its buffers
//! - [`SchedulingState`]: whether the device is free, how many tiles it has
//!   taken, and the completion handle of its latest launch
//!
//! ```text
//! Uninitialized ──prepare──▶ Ready ──launch──▶ Dispatched ──complete──▶ Ready
//!                                                  │
//!                             Ready / Dispatched ──drain──▶ Drained
//! ```

use crate::error::{Result, SearchError};
use crate::space::SearchSpace;
use crate::tile::{Tile, TileGeometry};
use sumsq_backends::{
    BufferHandle, CompletionHandle, CompletionNotifier, Device, DeviceInfo, EventStatus, GridDim, KernelArgs,
    KernelProgram, SearchLaunch,
};

const PAIR_BYTES: usize = 2 * std::mem::size_of::<u64>();

/// Lifecycle of a slot's device resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Uninitialized,
    Ready,
    Dispatched,
    Drained,
}

#[derive(Debug, Clone, Copy)]
struct SlotBuffers {
    count: BufferHandle,
    result: BufferHandle,
}

/// Raw contents of a drained slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReadback {
    /// Matches the device found, including ones it could not store
    pub result_count: u32,
    /// Stored pairs, `min(result_count, capacity)` of them
    pub pairs: Vec<(u64, u64)>,
}

/// Device capability half of a slot
pub struct DeviceResources {
    device: Box<dyn Device>,
    buffers: Option<SlotBuffers>,
    capacity: u32,
    phase: SlotPhase,
}

impl DeviceResources {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            buffers: None,
            capacity: 0,
            phase: SlotPhase::Uninitialized,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        self.device.info()
    }

    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Build `program` and allocate zeroed buffers for `capacity` pairs.
    #[tracing::instrument(skip(self), fields(device = %self.device.info().name))]
    pub fn prepare(&mut self, program: &KernelProgram, capacity: u32) -> Result<()> {
        self.device.build_program(program)?;

        let count = self.device.allocate_buffer(std::mem::size_of::<u32>())?;
        let result = self.device.allocate_buffer(capacity as usize * PAIR_BYTES)?;
        self.device.copy_to_buffer(count, bytemuck::bytes_of(&0u32))?;

        self.buffers = Some(SlotBuffers { count, result });
        self.capacity = capacity;
        self.phase = SlotPhase::Ready;
        Ok(())
    }

    /// Enqueue `tile` and flush the queue without waiting.
    pub fn launch(
        &mut self,
        tile: &Tile,
        space: &SearchSpace,
        geometry: &TileGeometry,
        notifier: Option<CompletionNotifier>,
    ) -> Result<CompletionHandle> {
        let buffers = match (self.phase, self.buffers) {
            (SlotPhase::Ready | SlotPhase::Dispatched, Some(buffers)) => buffers,
            (phase, _) => {
                return Err(SearchError::invalid_input(format!(
                    "cannot launch on {} in phase {phase:?}",
                    self.info().name
                )))
            }
        };

        let launch = SearchLaunch {
            count_buffer: buffers.count,
            result_buffer: buffers.result,
            capacity: self.capacity,
            args: KernelArgs {
                n: space.n(),
                start_x: tile.start_x,
                start_y: tile.start_y,
                kernel_span: geometry.kernel_span,
                tile_span: tile.span,
                max_xy: space.max_xy,
            },
            grid: GridDim::square(geometry.grid_width),
        };

        let handle = self.device.enqueue_search(&launch, notifier)?;
        self.device.flush()?;
        self.phase = SlotPhase::Dispatched;
        Ok(handle)
    }

    /// Block until the device queue is empty.
    pub fn drain(&mut self) -> Result<()> {
        if self.phase == SlotPhase::Uninitialized {
            return Ok(());
        }
        self.device.finish()?;
        self.phase = SlotPhase::Drained;
        Ok(())
    }

    /// Copy the count and the stored pairs back to the host.
    pub fn read_back(&mut self) -> Result<SlotReadback> {
        let index = self.info().index;
        let buffers = match (self.phase, self.buffers) {
            (SlotPhase::Drained, Some(buffers)) => buffers,
            _ => return Err(SearchError::NotDrained(index)),
        };

        let mut count = [0u32; 1];
        self.device
            .copy_from_buffer(buffers.count, bytemuck::cast_slice_mut(&mut count))?;
        let result_count = count[0];

        let stored = result_count.min(self.capacity) as usize;
        let mut flat = vec![0u64; 2 * stored];
        if stored > 0 {
            self.device
                .copy_from_buffer(buffers.result, bytemuck::cast_slice_mut(&mut flat))?;
        }

        Ok(SlotReadback {
            result_count,
            pairs: flat.chunks_exact(2).map(|p| (p[0], p[1])).collect(),
        })
    }
}

impl std::fmt::Debug for DeviceResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceResources")
            .field("device", self.info())
            .field("capacity", &self.capacity)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Scheduling half of a slot
#[derive(Debug, Clone)]
pub struct SchedulingState {
    pub free: bool,
    pub usage_count: u32,
    completion: Option<CompletionHandle>,
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self {
            free: true,
            usage_count: 0,
            completion: None,
        }
    }
}

impl SchedulingState {
    /// Hand the slot a tile whose launch is tracked by `completion`.
    pub fn mark_busy(&mut self, completion: CompletionHandle) {
        self.free = false;
        self.usage_count += 1;
        self.completion = Some(completion);
    }

    /// Free the slot if its latest launch has finished.
    ///
    /// Returns the failure message when that launch failed.
    pub fn refresh(&mut self) -> Option<String> {
        let status = self.completion.as_ref()?.status();
        if !status.is_terminal() {
            return None;
        }
        self.free = true;
        match status {
            EventStatus::Failed(message) => Some(message),
            _ => None,
        }
    }
}
