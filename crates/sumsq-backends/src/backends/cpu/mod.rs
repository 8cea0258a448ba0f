//! CPU device implementation
//!
//! Host-side implementation of the [`Device`] trait. Each `CpuDevice` behaves
//! like one accelerator with an in-order command queue: launches are staged on
//! the host until `flush`, then executed by the device's worker thread, which
//! spreads the work items of a launch across a rayon pool owned by the device.
//!
//! # Architecture
//!
//! ```text
//! CpuDevice
//! ├── KernelRegistry - entry point → kernel ("program build")
//! ├── MemoryManager  - handle-addressed buffers, shared with the worker
//! ├── pending        - launches enqueued but not yet flushed
//! └── Worker         - in-order queue thread plus a private rayon pool
//! ```
//!
//! # Usage
//!
//! ```rust
//! use sumsq_backends::{CpuDevice, Device, KernelRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut device = CpuDevice::new(0, KernelRegistry::shared())?;
//! assert_eq!(device.info().name, "cpu:0");
//!
//! let buffer = device.allocate_buffer(64)?;
//! device.free_buffer(buffer)?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod memory;
mod worker;

use crate::backend::{BufferHandle, Device, DeviceInfo, DeviceKind, KernelProgram, SearchLaunch};
use crate::completion::{CompletionHandle, CompletionNotifier, CompletionSignal, EventStatus};
use crate::error::{BackendError, BuildFailure, BuildStatus, Result};
use crate::kernel::SearchKernel;
use crate::registry::KernelRegistry;
use memory::MemoryManager;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use worker::{Job, Worker, WorkerCommand};

/// Host-side search device
pub struct CpuDevice {
    info: DeviceInfo,
    registry: Arc<KernelRegistry>,
    kernel: Option<Arc<dyn SearchKernel>>,
    memory: Arc<RwLock<MemoryManager>>,
    pending: Vec<Job>,
    worker: Worker,
}

impl CpuDevice {
    /// Create device number `index`, resolving programs through `registry`.
    ///
    /// The device's pool gets one thread per available core.
    pub fn new(index: usize, registry: Arc<KernelRegistry>) -> Result<Self> {
        Self::with_threads(index, registry, default_threads())
    }

    /// Create a device whose launches run on `threads` work-item threads.
    pub fn with_threads(index: usize, registry: Arc<KernelRegistry>, threads: usize) -> Result<Self> {
        let name = format!("cpu:{index}");
        let memory = Arc::new(RwLock::new(MemoryManager::new()));
        let worker = Worker::spawn(&name, Arc::clone(&memory), threads)?;

        Ok(Self {
            info: DeviceInfo {
                index,
                name,
                vendor: "host".to_string(),
                kind: DeviceKind::Cpu,
            },
            registry,
            kernel: None,
            memory,
            pending: Vec::new(),
            worker,
        })
    }

    fn validate(&self, launch: &SearchLaunch) -> Result<()> {
        if launch.grid.total_items() == 0 {
            return Err(BackendError::invalid_launch(format!("empty grid {}", launch.grid)));
        }
        if launch.args.kernel_span == 0 {
            return Err(BackendError::invalid_launch("kernel span must be positive"));
        }

        let memory = self.memory.read();
        let count_bytes = memory.buffer_size(launch.count_buffer)?;
        if count_bytes < std::mem::size_of::<u32>() {
            return Err(BackendError::invalid_launch(format!(
                "count buffer {} holds {count_bytes} bytes, need 4",
                launch.count_buffer
            )));
        }
        let result_bytes = memory.buffer_size(launch.result_buffer)?;
        if result_bytes < launch.result_bytes() {
            return Err(BackendError::invalid_launch(format!(
                "result buffer {} holds {result_bytes} bytes, capacity {} needs {}",
                launch.result_buffer,
                launch.capacity,
                launch.result_bytes()
            )));
        }
        Ok(())
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl fmt::Debug for CpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuDevice")
            .field("info", &self.info)
            .field("built", &self.kernel.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Device for CpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn build_program(&mut self, program: &KernelProgram) -> Result<()> {
        match self.registry.get(&program.entry) {
            Some(kernel) => {
                tracing::debug!(device = %self.info.name, entry = %program.entry, "program built");
                self.kernel = Some(kernel);
                Ok(())
            }
            None => {
                let mut log = format!("error: no kernel named `{}`\n", program.entry);
                let entries = self.registry.entries();
                if entries.is_empty() {
                    log.push_str("note: the kernel registry is empty\n");
                } else {
                    log.push_str(&format!("note: registered kernels: {}\n", entries.join(", ")));
                }
                Err(BuildFailure {
                    device: self.info.name.clone(),
                    status: BuildStatus::Error,
                    options: program.options.clone(),
                    log,
                }
                .into())
            }
        }
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        self.memory.write().allocate_buffer(size)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.write().free_buffer(handle)
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.write().copy_to_buffer(handle, data)
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.read().copy_from_buffer(handle, data)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.read().buffer_size(handle)
    }

    fn enqueue_search(
        &mut self,
        launch: &SearchLaunch,
        notifier: Option<CompletionNotifier>,
    ) -> Result<CompletionHandle> {
        let kernel = self
            .kernel
            .clone()
            .ok_or_else(|| BackendError::ProgramNotBuilt(self.info.name.clone()))?;
        self.validate(launch)?;

        let signal = CompletionSignal::new(notifier);
        self.pending.push(Job {
            kernel,
            launch: *launch,
            signal: Arc::clone(&signal),
        });
        Ok(CompletionHandle::new(signal))
    }

    fn flush(&mut self) -> Result<()> {
        for job in self.pending.drain(..) {
            job.signal.set_status(EventStatus::Submitted);
            self.worker.submit(WorkerCommand::Run(job))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.worker.fence()
    }
}
