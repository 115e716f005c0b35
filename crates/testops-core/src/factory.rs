use crate::config::{ConfigError, ConfigLoader, Mode, ReportFormat, ReporterConfig};
use crate::logging;
use crate::reporter::Reporter;
use crate::run_state::RunStateStore;
use crate::sink::{FileSink, Sink, TestOpsSink};
use crate::status_mapping::StatusMapping;
use std::sync::Arc;
use testops_client::{ClientConfig, ClientError, ClientInfo, TestOpsApi};
use testops_proto::ReportingService;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create TestOps client: {0}")]
    Client(#[from] ClientError),
}

/// Builds a [`Reporter`] with the sinks selected by `mode` and `fallback`.
pub struct ReporterFactory {
    config: ReporterConfig,
    service: Option<Arc<dyn ReportingService>>,
    client_info: ClientInfo,
}

impl ReporterFactory {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            service: None,
            client_info: ClientInfo::default(),
        }
    }

    /// Uses `service` instead of an HTTP client built from the config.
    pub fn with_service(mut self, service: Arc<dyn ReportingService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_client_info(mut self, info: ClientInfo) -> Self {
        self.client_info = info;
        self
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Loads configuration from the working directory and environment,
    /// installs logging and builds the reporter.
    pub fn create(framework: &str, reporter_name: &str) -> Result<Reporter, FactoryError> {
        let config = ConfigLoader::load()?;
        logging::init(config.debug);

        Self::new(config)
            .with_client_info(ClientInfo::new(framework, reporter_name))
            .build()
    }

    pub fn build(mut self) -> Result<Reporter, FactoryError> {
        self.config.validate()?;

        let primary = self.create_sink(self.config.mode)?;
        let fallback = self.create_sink(self.config.fallback)?;
        debug!(
            mode = self.config.mode.as_str(),
            fallback = self.config.fallback.as_str(),
            "Created reporter"
        );

        let mapping = StatusMapping::from_pairs(&self.config.status_mapping);
        Ok(Reporter::new(primary, fallback)
            .with_status_mapping(mapping)
            .with_root_suite(self.config.root_suite.clone()))
    }

    fn create_sink(&mut self, mode: Mode) -> Result<Option<Box<dyn Sink>>, FactoryError> {
        let sink: Box<dyn Sink> = match mode {
            Mode::Off => return Ok(None),
            Mode::TestOps => {
                let service = self.service()?;
                let project = self.config.testops.project.clone().unwrap_or_default();
                let state = RunStateStore::new(self.config.testops_state_path());
                Box::new(
                    TestOpsSink::new(service, project, self.config.testops.clone(), state)
                        .with_environment(self.config.environment.clone()),
                )
            }
            Mode::Report => {
                let connection = &self.config.report.connection;
                if connection.format == ReportFormat::Jsonp {
                    warn!("The jsonp report format is not supported, writing json");
                }
                let state = RunStateStore::new(self.config.report_state_path());
                Box::new(
                    FileSink::new(connection.path.clone(), state)
                        .with_environment(self.config.environment.clone()),
                )
            }
        };
        Ok(Some(sink))
    }

    /// The injected service, or a `TestOpsApi` created on first use and
    /// shared by both sinks.
    fn service(&mut self) -> Result<Arc<dyn ReportingService>, FactoryError> {
        if let Some(service) = &self.service {
            return Ok(Arc::clone(service));
        }

        let api = &self.config.testops.api;
        let client_config = ClientConfig::new(api.token.clone().unwrap_or_default(), api.host.clone())
            .with_defect(self.config.testops.defect);
        let service: Arc<dyn ReportingService> =
            Arc::new(TestOpsApi::new(client_config, self.client_info.clone())?);
        self.service = Some(Arc::clone(&service));
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReportingService;
    use tempfile::TempDir;

    fn testops_config(temp: &TempDir) -> ReporterConfig {
        let mut config = ReporterConfig {
            mode: Mode::TestOps,
            fallback: Mode::Report,
            state_dir: temp.path().join("state"),
            ..ReporterConfig::default()
        };
        config.testops.project = Some("DEMO".to_string());
        config.testops.api.token = Some("secret".to_string());
        config.report.connection.path = temp.path().join("report");
        config
    }

    #[test]
    fn test_builds_primary_and_fallback() {
        let temp = TempDir::new().unwrap();
        let reporter = ReporterFactory::new(testops_config(&temp))
            .with_service(Arc::new(MockReportingService::new()))
            .build()
            .unwrap();

        assert_eq!(reporter.active_sink(), Some("testops"));
        assert!(reporter.has_fallback());
    }

    #[test]
    fn test_off_mode_builds_inactive_reporter() {
        let reporter = ReporterFactory::new(ReporterConfig::default()).build().unwrap();
        assert!(reporter.active_sink().is_none());
        assert!(!reporter.has_fallback());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = testops_config(&temp);
        config.testops.api.token = None;

        let err = ReporterFactory::new(config).build().err().unwrap();
        assert!(matches!(
            err,
            FactoryError::Config(ConfigError::MissingTestOpsCredentials)
        ));
    }

    #[test]
    fn test_builds_http_client_without_injected_service() {
        let temp = TempDir::new().unwrap();
        let reporter = ReporterFactory::new(testops_config(&temp))
            .with_client_info(ClientInfo::new("cargo-test", "testops-core"))
            .build()
            .unwrap();

        assert_eq!(reporter.active_sink(), Some("testops"));
    }

    #[test]
    fn test_report_mode_uses_file_sink() {
        let temp = TempDir::new().unwrap();
        let mut config = testops_config(&temp);
        config.mode = Mode::Report;
        config.fallback = Mode::Off;

        let reporter = ReporterFactory::new(config).build().unwrap();
        assert_eq!(reporter.active_sink(), Some("report"));
        assert!(!reporter.has_fallback());
    }
}
