//! Test doubles for exercising sinks without a server.

mod mock_service;

pub use mock_service::{MockReportingService, ServiceCall};
