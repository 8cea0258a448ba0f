//! Test devices with controllable behavior

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sumsq_backends::{
    BackendError, BufferHandle, CompletionHandle, CompletionNotifier, CpuDevice, Device, DeviceInfo,
    KernelArgs, KernelFault, KernelProgram, KernelRegistry, SearchKernel, SearchLaunch, SumOfSquaresKernel,
    SUM_OF_SQUARES_ENTRY,
};
use sumsq_core::{SchedulerConfig, SearchConfig, WaitMode};

/// Reference kernel that takes `delay` per launch
pub struct Slow {
    pub delay: Duration,
}

impl SearchKernel for Slow {
    fn name(&self) -> &str {
        SUM_OF_SQUARES_ENTRY
    }

    fn run_work_item(
        &self,
        args: &KernelArgs,
        gx: u64,
        gy: u64,
        emit: &mut dyn FnMut(u64, u64),
    ) -> Result<(), KernelFault> {
        if gx == 0 && gy == 0 {
            thread::sleep(self.delay);
        }
        SumOfSquaresKernel.run_work_item(args, gx, gy, emit)
    }
}

/// Emits `hits` fake pairs from the first work item of the origin tile
pub struct Flood {
    pub hits: u64,
}

impl SearchKernel for Flood {
    fn name(&self) -> &str {
        SUM_OF_SQUARES_ENTRY
    }

    fn run_work_item(
        &self,
        args: &KernelArgs,
        gx: u64,
        gy: u64,
        emit: &mut dyn FnMut(u64, u64),
    ) -> Result<(), KernelFault> {
        if (args.start_x, args.start_y, gx, gy) == (0, 0, 0, 0) {
            for i in 0..self.hits {
                emit(i, i);
            }
        }
        Ok(())
    }
}

/// Fails every launch whose tile starts at `start_x`
pub struct FaultAt {
    pub start_x: u64,
}

impl SearchKernel for FaultAt {
    fn name(&self) -> &str {
        SUM_OF_SQUARES_ENTRY
    }

    fn run_work_item(
        &self,
        args: &KernelArgs,
        gx: u64,
        gy: u64,
        emit: &mut dyn FnMut(u64, u64),
    ) -> Result<(), KernelFault> {
        if args.start_x == self.start_x {
            return Err(KernelFault(format!("illegal address in tile x = {}", args.start_x)));
        }
        SumOfSquaresKernel.run_work_item(args, gx, gy, emit)
    }
}

/// Launches still running, recorded at every enqueue
#[derive(Default)]
pub struct LaunchLog {
    outstanding: Mutex<Vec<(usize, CompletionHandle)>>,
    peak: AtomicUsize,
    overlapping: AtomicUsize,
}

impl LaunchLog {
    fn record(&self, device: usize, handle: CompletionHandle) {
        let mut outstanding = self.outstanding.lock();
        outstanding.retain(|(_, h)| !h.is_terminal());
        if outstanding.iter().any(|(d, _)| *d == device) {
            self.overlapping.fetch_add(1, Ordering::SeqCst);
        }
        outstanding.push((device, handle));
        self.peak.fetch_max(outstanding.len(), Ordering::SeqCst);
    }

    /// Most launches running at once, across all devices
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Launches enqueued on a device whose previous launch had not finished
    pub fn overlapping(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }
}

/// Host device with hooks for observing or breaking its queue
pub struct HostDevice {
    inner: CpuDevice,
    fail_finish: bool,
    log: Option<Arc<LaunchLog>>,
}

impl HostDevice {
    /// Device whose `finish` reports a fault after draining
    pub fn failing_finish(index: usize) -> Box<dyn Device> {
        Box::new(Self {
            inner: CpuDevice::new(index, KernelRegistry::shared()).unwrap(),
            fail_finish: true,
            log: None,
        })
    }

    /// Device that records every launch in `log`
    pub fn logged(index: usize, log: &Arc<LaunchLog>) -> Box<dyn Device> {
        Box::new(Self {
            inner: CpuDevice::new(index, KernelRegistry::shared()).unwrap(),
            fail_finish: false,
            log: Some(Arc::clone(log)),
        })
    }
}

impl Device for HostDevice {
    fn info(&self) -> &DeviceInfo {
        self.inner.info()
    }

    fn build_program(&mut self, program: &KernelProgram) -> sumsq_backends::Result<()> {
        self.inner.build_program(program)
    }

    fn allocate_buffer(&mut self, size: usize) -> sumsq_backends::Result<BufferHandle> {
        self.inner.allocate_buffer(size)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> sumsq_backends::Result<()> {
        self.inner.free_buffer(handle)
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> sumsq_backends::Result<()> {
        self.inner.copy_to_buffer(handle, data)
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> sumsq_backends::Result<()> {
        self.inner.copy_from_buffer(handle, data)
    }

    fn buffer_size(&self, handle: BufferHandle) -> sumsq_backends::Result<usize> {
        self.inner.buffer_size(handle)
    }

    fn enqueue_search(
        &mut self,
        launch: &SearchLaunch,
        notifier: Option<CompletionNotifier>,
    ) -> sumsq_backends::Result<CompletionHandle> {
        let handle = self.inner.enqueue_search(launch, notifier)?;
        if let Some(log) = &self.log {
            log.record(self.inner.info().index, handle.clone());
        }
        Ok(handle)
    }

    fn flush(&mut self) -> sumsq_backends::Result<()> {
        self.inner.flush()
    }

    fn finish(&mut self) -> sumsq_backends::Result<()> {
        self.inner.finish()?;
        if self.fail_finish {
            return Err(BackendError::device_fault(
                self.inner.info().name.clone(),
                "finish failed: out of resources",
            ));
        }
        Ok(())
    }
}

pub fn registry_with(kernel: impl SearchKernel + 'static) -> Arc<KernelRegistry> {
    let registry = KernelRegistry::new();
    registry.register(Arc::new(kernel));
    Arc::new(registry)
}

pub fn cpu(index: usize, registry: Arc<KernelRegistry>) -> Box<dyn Device> {
    Box::new(CpuDevice::new(index, registry).unwrap())
}

/// Host device whose launches run on a single work-item thread
pub fn single_threaded(index: usize, registry: Arc<KernelRegistry>) -> Box<dyn Device> {
    Box::new(CpuDevice::with_threads(index, registry, 1).unwrap())
}

pub fn reference_devices(count: usize) -> Vec<Box<dyn Device>> {
    (0..count).map(|i| cpu(i, KernelRegistry::shared())).collect()
}

/// `x`, `y` with a geometry small enough to produce many tiles
pub fn small_config(x: u64, y: u64, wait: WaitMode) -> SearchConfig {
    SearchConfig {
        x,
        y,
        scheduler: SchedulerConfig {
            kernel_span: 1,
            grid_width: 2,
            capacity: 512,
            wait,
            poll_interval_ms: 1,
        },
    }
}

pub fn sorted(mut pairs: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    pairs.sort_unstable();
    pairs
}
