//! Multi-device scheduler for the sum-of-two-squares lattice search
//!
//! Finds every lattice point `(x, y)` in `[0, max_xy]²` with `x² + y² = N`
//! by cutting the square into tiles and feeding them to whichever device is
//! free.
//!
//! # Architecture
//!
//! ```text
//! SearchSpace ──▶ TilePartitioner ──▶ Dispatcher ──▶ ResultAggregator
//!   N, max_xy       lazy tiles        slots: DeviceResources + SchedulingState
//!                                     wait: Signal (default) | Poll
//! ```
//!
//! # Usage
//!
//! ```rust
//! use sumsq_backends::{BackendType, DeviceOptions};
//! use sumsq_core::{run, SchedulerConfig, SearchConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SearchConfig {
//!     x: 3,
//!     y: 4,
//!     scheduler: SchedulerConfig { kernel_span: 2, grid_width: 2, ..SchedulerConfig::default() },
//! };
//! let report = run(&config, BackendType::Cpu, &DeviceOptions::default())?;
//!
//! let mut pairs = report.result.pairs.clone();
//! pairs.sort_unstable();
//! assert_eq!(pairs, vec![(0, 5), (3, 4), (4, 3), (5, 0)]);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod search;
pub mod slot;
pub mod space;
pub mod tile;

pub use aggregator::{AggregatedResult, DeviceReport, ResultAggregator};
pub use config::{ConfigError, ConfigSource, LoadedConfig, SchedulerConfig, SearchConfig, WaitMode};
pub use diagnostics::BuildReport;
pub use dispatcher::{DispatchState, DispatchStats, Dispatcher, SlotFault, WaitStrategy};
pub use error::{Result, SearchError};
pub use search::{run, run_search, SearchReport};
pub use slot::{DeviceResources, SchedulingState, SlotPhase, SlotReadback};
pub use space::{SearchSpace, SearchTarget};
pub use tile::{Tile, TileGeometry, TilePartitioner, Tiles};
