//! Types for device configuration and handles

use crate::kernel::{KernelArgs, SUM_OF_SQUARES_ENTRY};
use std::fmt;

/// Handle to an allocated device buffer
///
/// Buffers are opaque handles managed by the device.
/// Use `Device` methods to interact with buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    /// Create a new buffer handle
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    /// Get the internal ID
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Grid of work items for one launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDim {
    pub x: u32,
    pub y: u32,
}

impl GridDim {
    /// Create new grid dimensions
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// `width × width` grid
    pub const fn square(width: u32) -> Self {
        Self { x: width, y: width }
    }

    /// Total number of work items
    pub const fn total_items(&self) -> u64 {
        self.x as u64 * self.y as u64
    }
}

impl Default for GridDim {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

impl fmt::Display for GridDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Coarse device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Accelerator => "accelerator",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Identity of an enumerated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in enumeration order
    pub index: usize,
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id = {} Device = {} ({}, {})", self.index, self.name, self.kind, self.vendor)
    }
}

/// Program to build on a device: an entry point plus build options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelProgram {
    pub entry: String,
    pub options: String,
}

impl KernelProgram {
    pub fn new(entry: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            options: options.into(),
        }
    }
}

impl Default for KernelProgram {
    fn default() -> Self {
        Self::new(SUM_OF_SQUARES_ENTRY, "")
    }
}

/// Everything needed to enqueue one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLaunch {
    /// One `u32`: total matches found so far by this device
    pub count_buffer: BufferHandle,
    /// `2 * capacity` `u64`s: pair `i` at indices `2i, 2i+1`
    pub result_buffer: BufferHandle,
    /// Maximum number of pairs the result buffer holds
    pub capacity: u32,
    pub args: KernelArgs,
    pub grid: GridDim,
}

impl SearchLaunch {
    /// Bytes the result buffer must provide
    pub const fn result_bytes(&self) -> usize {
        self.capacity as usize * 2 * std::mem::size_of::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_counts_items() {
        assert_eq!(GridDim::square(128).total_items(), 16_384);
        assert_eq!(GridDim::default().total_items(), 1);
        assert_eq!(GridDim::new(2, 3).to_string(), "(2, 3)");
    }

    #[test]
    fn default_program_targets_builtin_kernel() {
        let program = KernelProgram::default();
        assert_eq!(program.entry, SUM_OF_SQUARES_ENTRY);
        assert!(program.options.is_empty());
    }

    #[test]
    fn device_info_display() {
        let info = DeviceInfo {
            index: 1,
            name: "cpu:1".into(),
            vendor: "host".into(),
            kind: DeviceKind::Cpu,
        };
        assert_eq!(info.to_string(), "Id = 1 Device = cpu:1 (cpu, host)");
        assert_eq!(BufferHandle::new(4).to_string(), "buf4");
    }
}
