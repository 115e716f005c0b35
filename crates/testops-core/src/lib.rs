//! # testops-core
//!
//! Run lifecycle and result delivery for TestOps reporters.
//!
//! A framework adapter talks to one [`Reporter`]. The reporter forwards
//! results to a primary [`Sink`] and, if that sink fails, moves everything
//! it buffered into the fallback sink:
//!
//! - [`TestOpsSink`] batches results and uploads them through a
//!   [`testops_proto::ReportingService`]
//! - [`FileSink`] writes the run and its results to a local JSON tree
//!
//! Parallel worker processes that report into the same run coordinate
//! through a [`RunStateStore`]: the run is created by the first worker to
//! start and completed by the last one to finish.

pub mod config;
mod factory;
pub mod logging;
mod reporter;
pub mod run_state;
pub mod sink;
mod status_mapping;
pub mod testing;

pub use config::{ConfigError, ConfigLoader, Mode, ReporterConfig};
pub use factory::{FactoryError, ReporterFactory};
pub use reporter::Reporter;
pub use run_state::{RunState, RunStateStore, StateError};
pub use sink::{FileSink, Sink, SinkError, TestOpsSink};
pub use status_mapping::StatusMapping;
