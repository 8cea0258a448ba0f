//! OpenCL device implementation (feature `opencl`)
//!
//! Wraps one OpenCL device with its own context and in-order command queue.
//! Launches are enqueued with `clEnqueueNDRangeKernel` on a 2-D range of
//! `grid.x × grid.y` work items; completion is tracked through the launch's
//! event, either by polling `CL_EVENT_COMMAND_EXECUTION_STATUS` or by a
//! watcher thread that waits on the event and delivers the notifier token.

use crate::backend::{BufferHandle, Device, DeviceInfo, DeviceKind, KernelProgram, SearchLaunch};
use crate::completion::{Completion, CompletionHandle, CompletionNotifier, EventStatus};
use crate::error::{BackendError, BuildFailure, BuildStatus, Result};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{
    get_all_devices, Device as ClDevice, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU,
    CL_DEVICE_TYPE_GPU,
};
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_WRITE};
use opencl3::program::Program;
use opencl3::types::{cl_device_id, cl_device_type, cl_uint, cl_ulong, CL_BLOCKING};
use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use std::thread;

/// Source of the `x2y2n` search kernel
pub const X2Y2N_SOURCE: &str = include_str!("x2y2n.cl");

fn cl_err(operation: &'static str) -> impl FnOnce(ClError) -> BackendError {
    move |err| BackendError::OpenCl { operation, code: err.0 }
}

/// Ids of every OpenCL device on every platform, in platform order.
pub fn device_ids() -> Result<Vec<cl_device_id>> {
    get_all_devices(CL_DEVICE_TYPE_ALL).map_err(|err| BackendError::Enumeration(format!("OpenCL error {}", err.0)))
}

fn device_kind(dev_type: cl_device_type) -> DeviceKind {
    if dev_type & CL_DEVICE_TYPE_GPU != 0 {
        DeviceKind::Gpu
    } else if dev_type & CL_DEVICE_TYPE_CPU != 0 {
        DeviceKind::Cpu
    } else if dev_type & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceKind::Accelerator
    } else {
        DeviceKind::Other
    }
}

/// One OpenCL device with its own context and queue.
pub struct OpenClDevice {
    info: DeviceInfo,
    device: ClDevice,
    context: Context,
    queue: CommandQueue,
    program_source: String,
    kernel: Option<Kernel>,
    buffers: HashMap<u64, (Buffer<u8>, usize)>,
    next_buffer_id: u64,
}

// SAFETY: OpenCL 1.2+ guarantees thread safety for context, command queue,
// kernel and memory objects. The opencl3 wrappers hold opaque runtime handles;
// the device itself is only driven from one thread at a time (`&mut self`).
unsafe impl Send for OpenClDevice {}

impl OpenClDevice {
    /// Open device `id`, reporting it as enumeration index `index`.
    pub fn new(index: usize, id: cl_device_id) -> Result<Self> {
        Self::with_source(index, id, X2Y2N_SOURCE)
    }

    /// Like [`OpenClDevice::new`] but building `source` instead of the built-in kernel.
    pub fn with_source(index: usize, id: cl_device_id, source: &str) -> Result<Self> {
        let device = ClDevice::new(id);
        let name = device.name().unwrap_or_default().trim().to_string();
        let vendor = device.vendor().unwrap_or_default().trim().to_string();
        let kind = device_kind(device.dev_type().unwrap_or(0));

        let context = Context::from_device(&device).map_err(cl_err("create context"))?;
        // OpenCL 1.2 entry point; some platforms never shipped the 2.0 one.
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0).map_err(cl_err("create command queue"))?;

        Ok(Self {
            info: DeviceInfo {
                index,
                name,
                vendor,
                kind,
            },
            device,
            context,
            queue,
            program_source: source.to_string(),
            kernel: None,
            buffers: HashMap::new(),
            next_buffer_id: 1,
        })
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&(Buffer<u8>, usize)> {
        self.buffers
            .get(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    fn build_failure(&self, program: &Program, options: &str, fallback: ClError) -> BackendError {
        let id = self.device.id();
        let status = program
            .get_build_status(id)
            .map(BuildStatus::from_code)
            .unwrap_or(BuildStatus::Unknown(fallback.0));
        let options = program.get_build_options(id).unwrap_or_else(|_| options.to_string());
        let log = program.get_build_log(id).unwrap_or_default();

        BuildFailure {
            device: self.info.name.clone(),
            status,
            options,
            log,
        }
        .into()
    }
}

impl fmt::Debug for OpenClDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenClDevice")
            .field("info", &self.info)
            .field("built", &self.kernel.is_some())
            .field("buffers", &self.buffers.len())
            .finish_non_exhaustive()
    }
}

impl Device for OpenClDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn build_program(&mut self, program: &KernelProgram) -> Result<()> {
        let mut built =
            Program::create_from_source(&self.context, &self.program_source).map_err(cl_err("create program"))?;
        if let Err(err) = built.build(&[self.device.id()], &program.options) {
            return Err(self.build_failure(&built, &program.options, err));
        }

        let kernel = Kernel::create(&built, &program.entry).map_err(|err| {
            BackendError::from(BuildFailure {
                device: self.info.name.clone(),
                status: BuildStatus::Success,
                options: program.options.clone(),
                log: format!("kernel `{}` not found in program (OpenCL error {})", program.entry, err.0),
            })
        })?;

        tracing::debug!(device = %self.info.name, entry = %program.entry, "program built");
        self.kernel = Some(kernel);
        Ok(())
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        // SAFETY: no host pointer is passed; the runtime owns the allocation.
        let mut buffer = unsafe {
            Buffer::<u8>::create(&self.context, CL_MEM_READ_WRITE, size.max(1), ptr::null_mut())
                .map_err(cl_err("create buffer"))?
        };
        let zeros = vec![0u8; size.max(1)];
        // SAFETY: blocking write from a live host slice of the buffer's size.
        unsafe {
            self.queue
                .enqueue_write_buffer(&mut buffer, CL_BLOCKING, 0, &zeros, &[])
                .map_err(cl_err("zero buffer"))?;
        }

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, (buffer, size));
        Ok(BufferHandle::new(id))
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.buffers
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let (buffer, size) = self
            .buffers
            .get_mut(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        if data.len() > *size {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: *size,
            });
        }
        // SAFETY: blocking write; `data` outlives the call.
        unsafe {
            self.queue
                .enqueue_write_buffer(buffer, CL_BLOCKING, 0, data, &[])
                .map_err(cl_err("write buffer"))?;
        }
        Ok(())
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let (buffer, size) = self.buffer(handle)?;
        if data.len() > *size {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: *size,
            });
        }
        // SAFETY: blocking read into a live host slice.
        unsafe {
            self.queue
                .enqueue_read_buffer(buffer, CL_BLOCKING, 0, data, &[])
                .map_err(cl_err("read buffer"))?;
        }
        Ok(())
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.buffer(handle)?.1)
    }

    fn enqueue_search(
        &mut self,
        launch: &SearchLaunch,
        notifier: Option<CompletionNotifier>,
    ) -> Result<CompletionHandle> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| BackendError::ProgramNotBuilt(self.info.name.clone()))?;
        let (count, _) = self.buffer(launch.count_buffer)?;
        let (result, result_size) = self.buffer(launch.result_buffer)?;
        if *result_size < launch.result_bytes() {
            return Err(BackendError::invalid_launch(format!(
                "result buffer {} holds {result_size} bytes, capacity {} needs {}",
                launch.result_buffer,
                launch.capacity,
                launch.result_bytes()
            )));
        }

        let args = &launch.args;
        let scalars: [cl_ulong; 6] = [
            args.n,
            args.start_x,
            args.start_y,
            args.kernel_span,
            args.tile_span,
            args.max_xy,
        ];
        let capacity: cl_uint = launch.capacity;

        // SAFETY: argument order and types match the `x2y2n` signature; the
        // buffers stay alive in `self.buffers` until the queue is finished.
        let event = unsafe {
            ExecuteKernel::new(kernel)
                .set_arg(count)
                .set_arg(result)
                .set_arg(&scalars[0])
                .set_arg(&scalars[1])
                .set_arg(&scalars[2])
                .set_arg(&scalars[3])
                .set_arg(&scalars[4])
                .set_arg(&scalars[5])
                .set_arg(&capacity)
                .set_global_work_sizes(&[launch.grid.x as usize, launch.grid.y as usize])
                .enqueue_nd_range(&self.queue)
                .map_err(cl_err("enqueue kernel"))?
        };

        let completion = Arc::new(EventCompletion { event });
        if let Some(notifier) = notifier {
            let watched = Arc::clone(&completion);
            thread::Builder::new()
                .name(format!("sumsq-{}-event", self.info.name))
                .spawn(move || {
                    watched.wait();
                    notifier.notify();
                })
                .map_err(|err| BackendError::Other(format!("failed to spawn event watcher: {err}")))?;
        }
        Ok(CompletionHandle::new(completion))
    }

    fn flush(&mut self) -> Result<()> {
        self.queue.flush().map_err(cl_err("flush"))
    }

    fn finish(&mut self) -> Result<()> {
        self.queue.finish().map_err(cl_err("finish"))
    }
}

/// Completion backed by an OpenCL event
struct EventCompletion {
    event: Event,
}

// SAFETY: OpenCL event objects may be queried and waited on from any thread.
unsafe impl Send for EventCompletion {}
unsafe impl Sync for EventCompletion {}

impl fmt::Debug for EventCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCompletion").finish_non_exhaustive()
    }
}

impl Completion for EventCompletion {
    fn status(&self) -> EventStatus {
        match self.event.command_execution_status() {
            Ok(status) => EventStatus::from_cl_code(status.0),
            Err(err) => EventStatus::Failed(format!("status query failed: OpenCL error {}", err.0)),
        }
    }

    fn wait(&self) -> EventStatus {
        match self.event.wait() {
            Ok(()) => self.status(),
            Err(err) => EventStatus::Failed(format!("wait failed: OpenCL error {}", err.0)),
        }
    }
}
