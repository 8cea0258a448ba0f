//! Error types for device operations

use std::fmt;

/// Result type for device operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while preparing or driving a device
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(u64),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Kernel program failed to build on a device
    #[error("program build failed on {}: {}", .0.device, .0.status)]
    BuildFailed(Box<BuildFailure>),

    /// A launch was attempted before a program was built
    #[error("no program built on device {0}")]
    ProgramNotBuilt(String),

    /// Platform or device enumeration failed
    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    /// A submitted kernel failed on the device
    #[error("device {device} fault: {message}")]
    DeviceFault { device: String, message: String },

    /// Invalid launch configuration
    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    /// The device's command queue is gone (worker exited)
    #[error("command queue closed on device {0}")]
    QueueClosed(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// OpenCL runtime error
    #[cfg(feature = "opencl")]
    #[error("OpenCL error {code} during {operation}")]
    OpenCl { operation: &'static str, code: i32 },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a device fault error
    pub fn device_fault(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceFault {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create an invalid launch configuration error
    pub fn invalid_launch(msg: impl Into<String>) -> Self {
        Self::InvalidLaunchConfig(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }
}

/// Everything a device reports when its program fails to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// Device name as reported by enumeration
    pub device: String,
    /// Build status reported by the device
    pub status: BuildStatus,
    /// Options the build was invoked with
    pub options: String,
    /// Full compiler log
    pub log: String,
}

impl From<BuildFailure> for BackendError {
    fn from(failure: BuildFailure) -> Self {
        Self::BuildFailed(Box::new(failure))
    }
}

/// Program build status, mirroring the OpenCL `CL_BUILD_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    None,
    Error,
    InProgress,
    Unknown(i32),
}

impl BuildStatus {
    /// Map a raw `CL_BUILD_*` code
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::None,
            -2 => Self::Error,
            -3 => Self::InProgress,
            other => Self::Unknown(other),
        }
    }

    /// Raw `CL_BUILD_*` code
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::None => -1,
            Self::Error => -2,
            Self::InProgress => -3,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::None => "none",
            Self::Error => "error",
            Self::InProgress => "in progress",
            Self::Unknown(_) => "unknown",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_status_round_trips_known_codes() {
        for code in [0, -1, -2, -3, 7] {
            assert_eq!(BuildStatus::from_code(code).code(), code);
        }
        assert_eq!(BuildStatus::Error.to_string(), "error (-2)");
    }

    #[test]
    fn build_failure_message_names_device() {
        let err: BackendError = BuildFailure {
            device: "cpu:1".into(),
            status: BuildStatus::Error,
            options: String::new(),
            log: "boom".into(),
        }
        .into();
        assert_eq!(err.to_string(), "program build failed on cpu:1: error (-2)");
    }
}
