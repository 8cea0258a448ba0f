//! In-order execution queue for one CPU device
//!
//! Each CPU device owns one worker thread fed through a channel, which gives
//! the same ordering guarantees as an accelerator command queue: launches run
//! one after another in submission order, while the host thread keeps going.
//! Inside a launch the grid's work items are spread over the device's own
//! rayon pool, so a long launch on one device never holds another's threads.

use super::memory::MemoryManager;
use crate::backend::SearchLaunch;
use crate::completion::{CompletionSignal, EventStatus};
use crate::error::{BackendError, Result};
use crate::kernel::{KernelFault, SearchKernel};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One enqueued launch
pub(crate) struct Job {
    pub kernel: Arc<dyn SearchKernel>,
    pub launch: SearchLaunch,
    pub signal: Arc<CompletionSignal>,
}

pub(crate) enum WorkerCommand {
    Run(Job),
    /// Acknowledged once every earlier command has been processed
    Fence(Sender<()>),
}

pub(crate) struct Worker {
    name: String,
    tx: Option<Sender<WorkerCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the queue thread with a private pool of `threads` work-item threads.
    pub fn spawn(name: &str, memory: Arc<RwLock<MemoryManager>>, threads: usize) -> Result<Self> {
        let pool_name = name.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("sumsq-{pool_name}-{i}"))
            .build()
            .map_err(|err| BackendError::Other(format!("failed to build thread pool for {name}: {err}")))?;

        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name(format!("sumsq-{name}"))
            .spawn(move || worker_loop(rx, memory, pool))
            .map_err(|err| BackendError::Other(format!("failed to spawn worker for {name}: {err}")))?;

        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn submit(&self, command: WorkerCommand) -> Result<()> {
        self.tx
            .as_ref()
            .ok_or_else(|| BackendError::QueueClosed(self.name.clone()))?
            .send(command)
            .map_err(|_| BackendError::QueueClosed(self.name.clone()))
    }

    /// Block until everything submitted so far has executed
    pub fn fence(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.submit(WorkerCommand::Fence(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| BackendError::QueueClosed(self.name.clone()))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel lets the loop drain and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(device = %self.name, "cpu worker thread panicked");
            }
        }
    }
}

fn worker_loop(rx: Receiver<WorkerCommand>, memory: Arc<RwLock<MemoryManager>>, pool: ThreadPool) {
    for command in rx.iter() {
        match command {
            WorkerCommand::Run(job) => execute(job, &memory, &pool),
            WorkerCommand::Fence(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn execute(job: Job, memory: &RwLock<MemoryManager>, pool: &ThreadPool) {
    job.signal.set_status(EventStatus::Running);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pool.install(|| run_grid(job.kernel.as_ref(), &job.launch))
    }))
        .unwrap_or_else(|_| Err(KernelFault(format!("kernel `{}` panicked", job.kernel.name()))));

    match outcome {
        Ok(matches) => {
            let launch = &job.launch;
            let committed =
                memory
                    .write()
                    .commit_matches(launch.count_buffer, launch.result_buffer, launch.capacity, &matches);
            match committed {
                Ok(()) => job.signal.complete(),
                Err(err) => job.signal.fail(err.to_string()),
            }
        }
        Err(fault) => job.signal.fail(fault.0),
    }
}

/// Run every work item of the launch; matches come back in work-item order.
fn run_grid(kernel: &dyn SearchKernel, launch: &SearchLaunch) -> std::result::Result<Vec<(u64, u64)>, KernelFault> {
    let rows = launch.grid.y as u64;
    let per_item: Vec<Vec<(u64, u64)>> = (0..launch.grid.total_items())
        .into_par_iter()
        .map(|item| {
            let (gx, gy) = (item / rows, item % rows);
            let mut found = Vec::new();
            kernel.run_work_item(&launch.args, gx, gy, &mut |x, y| found.push((x, y)))?;
            Ok::<_, KernelFault>(found)
        })
        .collect::<std::result::Result<_, KernelFault>>()?;

    Ok(per_item.into_iter().flatten().collect())
}
