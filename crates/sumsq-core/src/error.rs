//! Error types for sumsq-core operations

use crate::config::ConfigError;
use sumsq_backends::{BackendError, BuildFailure};

/// Result type for sumsq-core operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can end a search run
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Enumeration produced no device (or could not run at all)
    #[error("no devices available: {0}")]
    NoDevices(String),

    /// A device failed to build the search program
    #[error("program build failed on {}: {}", .0.device, .0.status)]
    Build(Box<BuildFailure>),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A launched tile finished with an error status
    #[error("device {device} fault: {message}")]
    DeviceFault { device: String, message: String },

    /// Rejected search input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Search space arithmetic does not fit in u64
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// Buffers were read back before the slot was drained
    #[error("slot {0} read back before drain")]
    NotDrained(usize),

    /// Any other device error
    #[error(transparent)]
    Backend(BackendError),
}

impl SearchError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an arithmetic overflow error
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    /// Whether the run failed, as opposed to ending with a reportable condition
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoDevices(_))
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoDevices(_) => 0,
            Self::Config(_) | Self::InvalidInput(_) | Self::Overflow(_) => 2,
            _ => 1,
        }
    }
}

impl From<BackendError> for SearchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::BuildFailed(failure) => Self::Build(failure),
            BackendError::Enumeration(msg) => Self::NoDevices(msg),
            BackendError::DeviceFault { device, message } => Self::DeviceFault { device, message },
            other => Self::Backend(other),
        }
    }
}
