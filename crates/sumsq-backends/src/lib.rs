//! Devices for the sumsq lattice search
//!
//! This crate provides:
//! - **Device trait**: build a program, manage buffers, enqueue launches on an in-order queue
//! - **Completion tracking**: pollable handles plus token notifiers for signal-driven scheduling
//! - **Kernel contract**: the `x2y2n` work-item semantics shared by every device
//! - **CPU device**: worker-thread queue with rayon-parallel work items
//! - **OpenCL device**: real accelerators through `opencl3` (feature `opencl`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Scheduler                            │
//! │        (tiles, free-device selection, drain)             │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │  SearchLaunch + CompletionNotifier
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Device trait                           │
//! └─────────────────────┬───────────────────────────────────┘
//!               ┌───────┴───────┐
//!               ▼               ▼
//!         ┌─────────┐     ┌──────────┐
//!         │   CPU   │     │  OpenCL  │
//!         │ Device  │     │  Device  │
//!         └─────────┘     └──────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use sumsq_backends::{CpuDevice, Device, GridDim, KernelArgs, KernelProgram, KernelRegistry, SearchLaunch};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut device = CpuDevice::new(0, KernelRegistry::shared())?;
//! device.build_program(&KernelProgram::default())?;
//!
//! let count_buffer = device.allocate_buffer(4)?;
//! let result_buffer = device.allocate_buffer(8 * 16)?;
//! let launch = SearchLaunch {
//!     count_buffer,
//!     result_buffer,
//!     capacity: 8,
//!     args: KernelArgs { n: 25, start_x: 0, start_y: 0, kernel_span: 4, tile_span: 7, max_xy: 6 },
//!     grid: GridDim::square(2),
//! };
//!
//! let handle = device.enqueue_search(&launch, None)?;
//! device.finish()?;
//! assert!(handle.is_terminal());
//!
//! let mut count = [0u32; 1];
//! device.copy_from_buffer(count_buffer, bytemuck::cast_slice_mut(&mut count))?;
//! assert_eq!(count[0], 4);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod completion;
pub mod enumerate;
pub mod error;
pub mod kernel;
pub mod registry;

// Re-export public API
pub use backend::{BufferHandle, Device, DeviceInfo, DeviceKind, GridDim, KernelProgram, SearchLaunch};
pub use backends::CpuDevice;
#[cfg(feature = "opencl")]
pub use backends::OpenClDevice;
pub use completion::{completion_channel, Completion, CompletionHandle, CompletionNotifier, CompletionSignal, EventStatus};
pub use enumerate::{list_devices, BackendType, DeviceOptions, DEFAULT_CPU_DEVICES};
pub use error::{BackendError, BuildFailure, BuildStatus, Result};
pub use kernel::{isqrt, KernelArgs, KernelFault, SearchKernel, SumOfSquaresKernel, SUM_OF_SQUARES_ENTRY};
pub use registry::KernelRegistry;
