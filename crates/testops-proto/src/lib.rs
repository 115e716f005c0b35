//! # testops-proto
//!
//! Shared types, error definitions, and traits for TestOps reporters.
//!
//! This crate provides the foundational abstractions used across the
//! reporter crates, including:
//! - The test result model (results, steps, attachments, suite relations)
//! - The closed [`Status`] enum used for mapping and filtering
//! - Result signatures used for deduplication on the server
//! - The [`ReportingService`] trait that remote sinks talk to

mod attachment;
mod configuration;
mod error;
mod result;
mod service;
pub mod signature;
mod status;
mod step;

pub use attachment::{Attachment, AttachmentError};
pub use configuration::{ConfigurationGroup, ConfigurationItem};
pub use error::ServiceError;
pub use result::{Relations, ResultExecution, Suite, SuiteData, TestResult};
pub use service::{ExternalIssueLink, ExternalLinkType, ReportingService, RunCreate};
pub use signature::generate_signature;
pub use status::{Status, UnknownStatus};
pub use step::{Step, StepData, StepExecution};
