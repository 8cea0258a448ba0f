//! Device trait and types for kernel execution

mod traits;
mod types;

pub use traits::Device;
pub use types::{BufferHandle, DeviceInfo, DeviceKind, GridDim, KernelProgram, SearchLaunch};
