//! Completion tracking for asynchronous kernel submissions
//!
//! Every enqueue returns a [`CompletionHandle`]. The scheduler can either poll
//! [`CompletionHandle::status`] or hand the device a [`CompletionNotifier`]
//! that pushes the slot's token onto a shared channel once the submission
//! reaches a terminal status.
//!
//! ```text
//! Queued ──flush──▶ Submitted ──▶ Running ──▶ Complete
//!                                         └──▶ Failed(msg)
//! ```

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;

/// Execution status of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    /// Enqueued on the host, not yet flushed to the device
    Queued,
    /// Flushed to the device
    Submitted,
    /// Executing
    Running,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Failed(String),
}

impl EventStatus {
    /// Whether the submission will never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }

    /// Map an OpenCL `CL_COMMAND_EXECUTION_STATUS` value
    pub fn from_cl_code(code: i32) -> Self {
        match code {
            0 => Self::Complete,
            1 => Self::Running,
            2 => Self::Submitted,
            3 => Self::Queued,
            err => Self::Failed(format!("execution status {err}")),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Submitted => f.write_str("submitted"),
            Self::Running => f.write_str("running"),
            Self::Complete => f.write_str("complete"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Something that can report the status of one submission.
pub trait Completion: Send + Sync + fmt::Debug {
    /// Current status (non-blocking)
    fn status(&self) -> EventStatus;

    /// Block until the status is terminal and return it
    fn wait(&self) -> EventStatus;
}

/// Opaque, cloneable handle to one submission's completion.
#[derive(Clone, Debug)]
pub struct CompletionHandle(Arc<dyn Completion>);

impl CompletionHandle {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self(completion)
    }

    /// Current status (non-blocking)
    pub fn status(&self) -> EventStatus {
        self.0.status()
    }

    /// Block until terminal
    pub fn wait(&self) -> EventStatus {
        self.0.wait()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Sends a slot token to the scheduler when a submission finishes.
#[derive(Clone, Debug)]
pub struct CompletionNotifier {
    token: usize,
    tx: Sender<usize>,
}

impl CompletionNotifier {
    pub fn new(token: usize, tx: Sender<usize>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> usize {
        self.token
    }

    /// Deliver the token. A dropped receiver means nobody is waiting anymore.
    pub fn notify(self) {
        let _ = self.tx.send(self.token);
    }
}

/// Channel used to carry completion tokens from devices to the scheduler.
pub fn completion_channel() -> (Sender<usize>, Receiver<usize>) {
    crossbeam_channel::unbounded()
}

/// Host-side completion state, settled by whoever executes the submission.
///
/// The CPU device settles it from its worker thread; the OpenCL device
/// settles it from the driver's event.
#[derive(Debug)]
pub struct CompletionSignal {
    state: Mutex<SignalState>,
    settled: Condvar,
}

#[derive(Debug)]
struct SignalState {
    status: EventStatus,
    notifier: Option<CompletionNotifier>,
}

impl CompletionSignal {
    pub fn new(notifier: Option<CompletionNotifier>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SignalState {
                status: EventStatus::Queued,
                notifier,
            }),
            settled: Condvar::new(),
        })
    }

    /// Move to `status`. Transitions out of a terminal status are ignored.
    pub fn set_status(&self, status: EventStatus) {
        let notifier = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            let terminal = status.is_terminal();
            state.status = status;
            if !terminal {
                return;
            }
            self.settled.notify_all();
            state.notifier.take()
        };

        if let Some(notifier) = notifier {
            notifier.notify();
        }
    }

    pub fn complete(&self) {
        self.set_status(EventStatus::Complete);
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.set_status(EventStatus::Failed(message.into()));
    }
}

impl Completion for CompletionSignal {
    fn status(&self) -> EventStatus {
        self.state.lock().status.clone()
    }

    fn wait(&self) -> EventStatus {
        let mut state = self.state.lock();
        while !state.status.is_terminal() {
            self.settled.wait(&mut state);
        }
        state.status.clone()
    }
}
