//! Blocking HTTP client for the TestOps reporting API.
//!
//! [`TestOpsApi`] implements [`testops_proto::ReportingService`] on top of the
//! v1 API (runs, environments, configurations, attachments, external issues,
//! public reports) and the v2 API (bulk results).
//!
//! # Example
//!
//! ```no_run
//! use testops_client::{ClientConfig, ClientInfo, TestOpsApi};
//! use testops_proto::{ReportingService, RunCreate};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("secret-token", "qase.io");
//!     let api = TestOpsApi::new(config, ClientInfo::default())?;
//!
//!     let run = RunCreate {
//!         title: "Nightly".to_string(),
//!         ..RunCreate::default()
//!     };
//!     let run_id = api.create_run("DEMO", &run)?;
//!     api.complete_run("DEMO", run_id);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod attachments;
pub mod config;
pub mod convert;
pub mod error;
pub mod headers;
pub mod types;

pub use api::TestOpsApi;
pub use config::{ClientConfig, ClientInfo};
pub use error::{ClientError, Result};
