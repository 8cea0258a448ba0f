//! Device enumeration
//!
//! Turns a backend choice into the ordered list of devices the scheduler
//! drives. Enumeration order is the device index order everywhere else.

use crate::backend::Device;
use crate::backends::CpuDevice;
use crate::error::{BackendError, Result};
use crate::registry::KernelRegistry;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Default number of host devices
pub const DEFAULT_CPU_DEVICES: usize = 2;

/// Which device family to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    #[default]
    Cpu,
    OpenCl,
}

impl BackendType {
    /// Whether this build can drive the backend
    pub const fn is_available(self) -> bool {
        match self {
            Self::Cpu => true,
            Self::OpenCl => cfg!(feature = "opencl"),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::OpenCl => "opencl",
        })
    }
}

impl FromStr for BackendType {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "host" => Ok(Self::Cpu),
            "opencl" | "cl" => Ok(Self::OpenCl),
            other => Err(BackendError::unsupported(format!("unknown backend `{other}`"))),
        }
    }
}

/// Enumeration options
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Number of host devices to create for [`BackendType::Cpu`]
    pub cpu_devices: usize,
    /// Work-item threads per host device; `None` uses one per core
    pub cpu_threads: Option<usize>,
    /// Kernels available to host devices
    pub registry: Arc<KernelRegistry>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            cpu_devices: DEFAULT_CPU_DEVICES,
            cpu_threads: None,
            registry: KernelRegistry::shared(),
        }
    }
}

/// Enumerate the devices of `backend`, in index order.
///
/// An empty list is not an error; callers decide what "no devices" means.
/// A platform that cannot be queried at all is `BackendError::Enumeration`.
pub fn list_devices(backend: BackendType, options: &DeviceOptions) -> Result<Vec<Box<dyn Device>>> {
    let devices = match backend {
        BackendType::Cpu => (0..options.cpu_devices)
            .map(|index| {
                let registry = Arc::clone(&options.registry);
                match options.cpu_threads {
                    Some(threads) => CpuDevice::with_threads(index, registry, threads),
                    None => CpuDevice::new(index, registry),
                }
                .map(|d| Box::new(d) as Box<dyn Device>)
            })
            .collect::<Result<Vec<_>>>()?,
        BackendType::OpenCl => list_opencl()?,
    };

    for device in &devices {
        tracing::debug!(backend = %backend, device = %device.info(), "device enumerated");
    }
    Ok(devices)
}

#[cfg(feature = "opencl")]
fn list_opencl() -> Result<Vec<Box<dyn Device>>> {
    use crate::backends::OpenClDevice;

    crate::backends::opencl::device_ids()?
        .into_iter()
        .enumerate()
        .map(|(index, id)| OpenClDevice::new(index, id).map(|d| Box::new(d) as Box<dyn Device>))
        .collect()
}

#[cfg(not(feature = "opencl"))]
fn list_opencl() -> Result<Vec<Box<dyn Device>>> {
    Err(BackendError::unsupported("OpenCL support was not compiled in (enable the `opencl` feature)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("cpu".parse::<BackendType>().unwrap(), BackendType::Cpu);
        assert_eq!("OpenCL".parse::<BackendType>().unwrap(), BackendType::OpenCl);
        assert!("cuda".parse::<BackendType>().is_err());
        assert_eq!(BackendType::OpenCl.to_string(), "opencl");
    }

    #[test]
    fn cpu_devices_are_indexed_in_order() {
        let options = DeviceOptions {
            cpu_devices: 3,
            ..DeviceOptions::default()
        };
        let devices = list_devices(BackendType::Cpu, &options).unwrap();
        let indices: Vec<usize> = devices.iter().map(|d| d.info().index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(devices[2].info().name, "cpu:2");
    }

    #[test]
    fn thread_count_option_builds_devices() {
        let options = DeviceOptions {
            cpu_devices: 2,
            cpu_threads: Some(1),
            ..DeviceOptions::default()
        };
        let devices = list_devices(BackendType::Cpu, &options).unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn zero_cpu_devices_is_empty_not_error() {
        let options = DeviceOptions {
            cpu_devices: 0,
            ..DeviceOptions::default()
        };
        assert!(list_devices(BackendType::Cpu, &options).unwrap().is_empty());
    }

    #[cfg(not(feature = "opencl"))]
    #[test]
    fn opencl_without_feature_is_unsupported() {
        assert!(!BackendType::OpenCl.is_available());
        assert!(matches!(
            list_devices(BackendType::OpenCl, &DeviceOptions::default()),
            Err(BackendError::UnsupportedOperation(_))
        ));
    }
}
