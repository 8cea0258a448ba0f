//! Search configuration
//!
//! A run is configured from an optional JSON file:
//!
//! ```json
//! { "x": 3, "y": 4, "scheduler": { "wait": "poll", "poll_interval_ms": 1 } }
//! ```
//!
//! `x` and `y` are required; the `scheduler` section and each of its fields
//! are optional. A missing file means "use the defaults"; a file that exists
//! but cannot be read or parsed, or lacks `x` or `y`, is an error.

use crate::dispatcher::WaitStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default first input
pub const DEFAULT_X: u64 = 60001;
/// Default second input
pub const DEFAULT_Y: u64 = 60002;
/// Side of the square scanned by one work item
pub const DEFAULT_KERNEL_SPAN: u64 = 128;
/// Work items per launch along each axis
pub const DEFAULT_GRID_WIDTH: u32 = 128;
/// Result pairs each device can store
pub const DEFAULT_CAPACITY: u32 = 512;
/// Sleep between polling scans
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3;

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the dispatcher waits for a free device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Block on completion notifications
    #[default]
    Signal,
    /// Scan completion statuses, sleeping between scans
    Poll,
}

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub kernel_span: u64,
    pub grid_width: u32,
    pub capacity: u32,
    pub wait: WaitMode,
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kernel_span: DEFAULT_KERNEL_SPAN,
            grid_width: DEFAULT_GRID_WIDTH,
            capacity: DEFAULT_CAPACITY,
            wait: WaitMode::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn wait_strategy(&self) -> WaitStrategy {
        match self.wait {
            WaitMode::Signal => WaitStrategy::Signal,
            WaitMode::Poll => WaitStrategy::Poll {
                interval: Duration::from_millis(self.poll_interval_ms),
            },
        }
    }

    /// Reject values no launch can be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel_span == 0 {
            return Err(ConfigError::Invalid("kernel_span must be positive".into()));
        }
        if self.grid_width == 0 {
            return Err(ConfigError::Invalid("grid_width must be positive".into()));
        }
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be positive".into()));
        }
        match self.kernel_span.checked_mul(self.grid_width as u64) {
            Some(extent) if extent >= 2 => Ok(()),
            Some(_) => Err(ConfigError::Invalid(
                "kernel_span * grid_width must be at least 2".into(),
            )),
            None => Err(ConfigError::Invalid(
                "kernel_span * grid_width overflows u64".into(),
            )),
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub x: u64,
    pub y: u64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            x: DEFAULT_X,
            y: DEFAULT_Y,
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Where a configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
}

/// A configuration together with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: SearchConfig,
    pub source: ConfigSource,
}

impl SearchConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load `path`, falling back to defaults when it does not exist.
    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(LoadedConfig {
                config: Self::default(),
                source: ConfigSource::Defaults,
            });
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.scheduler.validate()?;

        tracing::debug!(path = %path.display(), x = config.x, y = config.y, "config loaded");
        Ok(LoadedConfig {
            config,
            source: ConfigSource::File(path.to_path_buf()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_inputs() {
        let config = SearchConfig::default();
        assert_eq!(config.x, 60001);
        assert_eq!(config.y, 60002);
        assert_eq!(config.scheduler.capacity, 512);
    }

    #[test]
    fn coordinates_are_required() {
        assert!(SearchConfig::from_json("{}").is_err());
        assert!(SearchConfig::from_json(r#"{"x": 3}"#).is_err());
        assert!(SearchConfig::from_json(r#"{"x": 3, "Y": 4}"#).is_err());

        let config = SearchConfig::from_json(r#"{"x": 3, "y": 4}"#).unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn partial_scheduler_section_keeps_other_defaults() {
        let config = SearchConfig::from_json(r#"{"x": 3, "y": 4, "scheduler": {"wait": "poll"}}"#).unwrap();
        assert_eq!((config.x, config.y), (3, 4));
        assert_eq!(config.scheduler.wait, WaitMode::Poll);
        assert_eq!(config.scheduler.kernel_span, DEFAULT_KERNEL_SPAN);
        assert_eq!(
            config.scheduler.wait_strategy(),
            WaitStrategy::Poll {
                interval: Duration::from_millis(3)
            }
        );
    }

    #[test]
    fn signal_is_the_default_wait() {
        assert_eq!(SchedulerConfig::default().wait_strategy(), WaitStrategy::Signal);
    }

    #[test]
    fn degenerate_scheduler_is_rejected() {
        let mut scheduler = SchedulerConfig {
            kernel_span: 1,
            grid_width: 1,
            ..SchedulerConfig::default()
        };
        assert!(scheduler.validate().is_err());

        scheduler.grid_width = 2;
        assert!(scheduler.validate().is_ok());

        scheduler.capacity = 0;
        assert!(scheduler.validate().is_err());
    }

    #[test]
    fn unknown_wait_mode_fails_to_parse() {
        assert!(SearchConfig::from_json(r#"{"x": 3, "y": 4, "scheduler": {"wait": "spin"}}"#).is_err());
    }
}
