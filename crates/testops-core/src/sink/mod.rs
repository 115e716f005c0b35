//! Reporting backends.

mod file;
mod report;
mod testops;

pub use file::{FileSink, RunDocument, RunExecution, RunStats, ShortResult};
pub use report::result_to_report;
pub use testops::TestOpsSink;

use crate::run_state::StateError;
use testops_proto::{ServiceError, TestResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run state error: {0}")]
    State(#[from] StateError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Run {0} not found")]
    RunNotFound(i64),

    #[error("Failed to encode report: {0}")]
    Encode(String),

    #[error("Sink is not started")]
    NotStarted,
}

/// A backend that accepts results and owns a run's lifecycle.
///
/// Every sink buffers results in memory and exposes the buffer through
/// [`Sink::take_results`] / [`Sink::set_results`] so a failing sink's work
/// can be moved to another one.
pub trait Sink: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn start_run(&mut self) -> Result<(), SinkError>;

    fn complete_run(&mut self) -> Result<(), SinkError>;

    fn add_result(&mut self, result: TestResult) -> Result<(), SinkError>;

    /// Delivers everything buffered so far.
    fn send_results(&mut self) -> Result<(), SinkError>;

    /// Gives up this sink's share of the run without completing it.
    ///
    /// Called when the sink is replaced mid-session. A sink that never
    /// started has nothing to release.
    fn abandon(&mut self) -> Result<(), SinkError>;

    /// Removes and returns the buffered results.
    fn take_results(&mut self) -> Vec<TestResult>;

    /// Replaces the buffer with `results`.
    fn set_results(&mut self, results: Vec<TestResult>);

    /// Borrows the buffered results.
    fn results(&self) -> &[TestResult];
}
