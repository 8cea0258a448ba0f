//! Device implementations
//!
//! - `cpu` - host device: worker-thread queue, rayon inside each launch
//! - `opencl` - OpenCL device (feature `opencl`)

pub mod cpu;
#[cfg(feature = "opencl")]
pub mod opencl;

pub use cpu::CpuDevice;
#[cfg(feature = "opencl")]
pub use opencl::OpenClDevice;
