//! Device trait: the capability set of one accelerator
//!
//! A device can build a program, allocate and move buffers, and enqueue
//! search launches on an in-order queue. Scheduling state (free/busy, usage)
//! is deliberately not part of this trait; the scheduler keeps it separately,
//! indexed like the devices.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Device Trait                   │
//! │  - build_program()                             │
//! │  - buffer management (allocate/free/copy)      │
//! │  - enqueue_search() / flush() / finish()       │
//! └──────────────────────┬────────────────────────┘
//!                 ┌──────┴──────┐
//!                 ▼             ▼
//!           ┌─────────┐   ┌──────────┐
//!           │   CPU   │   │  OpenCL  │
//!           │ Device  │   │  Device  │
//!           └─────────┘   └──────────┘
//! ```

use super::types::{BufferHandle, DeviceInfo, KernelProgram, SearchLaunch};
use crate::completion::{CompletionHandle, CompletionNotifier};
use crate::error::Result;

/// One accelerator device.
///
/// # Queue model
///
/// Launches are enqueued in order and execute asynchronously. `enqueue_search`
/// never blocks on execution; `flush` hands everything enqueued so far to the
/// device without waiting; `finish` blocks until every launch enqueued so far
/// has reached a terminal status.
///
/// # Example
///
/// ```rust
/// use sumsq_backends::{CpuDevice, Device, KernelProgram, KernelRegistry};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut device = CpuDevice::new(0, KernelRegistry::shared())?;
/// device.build_program(&KernelProgram::default())?;
///
/// let buffer = device.allocate_buffer(16)?;
/// device.copy_to_buffer(buffer, bytemuck::cast_slice(&[7u64, 9]))?;
///
/// let mut back = [0u64; 2];
/// device.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut back))?;
/// assert_eq!(back, [7, 9]);
/// # Ok(())
/// # }
/// ```
pub trait Device: Send {
    /// Identity of this device
    fn info(&self) -> &DeviceInfo;

    /// Build `program` for this device.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::BuildFailed` with status, options and the
    /// complete build log when compilation (or entry point resolution) fails.
    fn build_program(&mut self, program: &KernelProgram) -> Result<()>;

    /// Allocate a zero-initialised buffer of `size` bytes
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle>;

    /// Free a previously allocated buffer
    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()>;

    /// Copy host data into the start of a buffer (blocking)
    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()>;

    /// Copy the start of a buffer into host memory (blocking).
    ///
    /// Callers must `finish` the queue first; reading a buffer that a
    /// running launch writes to observes a partial result.
    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()>;

    /// Buffer size in bytes
    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    /// Enqueue one launch. `notifier`, when given, fires once the launch
    /// reaches a terminal status.
    fn enqueue_search(
        &mut self,
        launch: &SearchLaunch,
        notifier: Option<CompletionNotifier>,
    ) -> Result<CompletionHandle>;

    /// Submit everything enqueued so far without waiting
    fn flush(&mut self) -> Result<()>;

    /// Block until all enqueued work has finished
    fn finish(&mut self) -> Result<()>;
}
