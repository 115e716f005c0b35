use super::{Sink, SinkError};
use crate::config::TestOpsConfig;
use crate::run_state::RunStateStore;
use std::sync::Arc;
use testops_proto::{
    ConfigurationGroup, ExternalIssueLink, ReportingService, RunCreate, TestResult,
};
use tracing::{debug, error, info};

/// Batches results and uploads them to the TestOps service.
pub struct TestOpsSink {
    service: Arc<dyn ReportingService>,
    project: String,
    config: TestOpsConfig,
    environment: Option<String>,
    state: RunStateStore,
    run_id: Option<i64>,
    results: Vec<TestResult>,
    /// Fetched once and kept for the sink's lifetime.
    configuration_groups: Option<Vec<ConfigurationGroup>>,
}

impl TestOpsSink {
    pub fn new(
        service: Arc<dyn ReportingService>,
        project: impl Into<String>,
        config: TestOpsConfig,
        state: RunStateStore,
    ) -> Self {
        Self {
            service,
            project: project.into(),
            config,
            environment: None,
            state,
            run_id: None,
            results: Vec::new(),
            configuration_groups: None,
        }
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch.size.max(1)
    }

    /// Results without a status are always kept.
    fn should_include(&self, result: &TestResult) -> bool {
        match result.status() {
            Some(status) => !self.config.status_filter.contains(&status),
            None => true,
        }
    }

    fn create_new_run(&mut self) -> Result<i64, SinkError> {
        let environment_id = match self.environment.as_deref().filter(|e| !e.is_empty()) {
            Some(name) => self.service.resolve_environment_id(&self.project, name),
            None => None,
        };

        let run = RunCreate {
            title: self.config.run.title_or_default(),
            description: self.config.run.description.clone(),
            plan_id: self.config.plan.id,
            environment_id,
            tags: self.config.run.tags.clone(),
            configurations: self.prepare_configurations(),
        };

        let run_id = self.service.create_run(&self.project, &run)?;
        self.update_external_issue(run_id);
        Ok(run_id)
    }

    fn update_external_issue(&self, run_id: i64) {
        let Some((link_type, link)) = self.config.run.external_link.resolved() else {
            return;
        };

        let links = [ExternalIssueLink {
            run_id,
            external_issue: link.to_string(),
        }];
        if let Err(e) = self
            .service
            .update_external_issue_link(&self.project, link_type, &links)
        {
            error!("Failed to update external issue: {}", e);
        }
    }

    /// Resolves configured `group = item` pairs to item ids.
    fn prepare_configurations(&mut self) -> Vec<i64> {
        let values = self.config.configurations.values.clone();
        let mut ids = Vec::new();

        for value in &values {
            let Some(group_id) = self.find_or_create_group(&value.name) else {
                debug!("Configuration group '{}' not resolved, skipping", value.name);
                continue;
            };
            match self.find_or_create_item(group_id, &value.value) {
                Some(item_id) => ids.push(item_id),
                None => debug!(
                    "Configuration '{}' in group '{}' not resolved, skipping",
                    value.value, value.name
                ),
            }
        }

        ids
    }

    fn cached_groups(&mut self) -> &[ConfigurationGroup] {
        if self.configuration_groups.is_none() {
            let groups = self.service.configuration_groups(&self.project);
            self.configuration_groups = Some(groups);
        }
        self.configuration_groups.as_deref().unwrap_or_default()
    }

    fn find_or_create_group(&mut self, title: &str) -> Option<i64> {
        if let Some(group) = self.cached_groups().iter().find(|g| g.title == title) {
            return Some(group.id);
        }
        if !self.config.configurations.create_if_not_exists {
            return None;
        }
        self.service
            .create_configuration_group(&self.project, title)
            .map(|group| group.id)
    }

    fn find_or_create_item(&mut self, group_id: i64, title: &str) -> Option<i64> {
        let existing = self
            .cached_groups()
            .iter()
            .find(|g| g.id == group_id)
            .and_then(|g| g.find_item(title))
            .map(|item| item.id);
        if existing.is_some() {
            return existing;
        }
        if !self.config.configurations.create_if_not_exists {
            return None;
        }
        self.service
            .create_configuration_item(&self.project, group_id, title)
            .map(|item| item.id)
    }

    /// Sends the oldest batch and drops it from the buffer once delivered.
    fn flush_batch(&mut self) -> Result<(), SinkError> {
        let run_id = self.run_id.ok_or(SinkError::NotStarted)?;
        let count = self.batch_size().min(self.results.len());

        self.service
            .send_result_batch(&self.project, run_id, &self.results[..count])?;
        self.results.drain(..count);

        debug!(run_id, count, remaining = self.results.len(), "Sent result batch");
        Ok(())
    }

    fn show_public_report(&self, run_id: i64) {
        if !self.config.show_public_report_link {
            return;
        }
        if let Some(url) = self.service.enable_public_report(&self.project, run_id) {
            info!("Public report link: {}", url);
        }
    }
}

impl Sink for TestOpsSink {
    fn name(&self) -> &'static str {
        "testops"
    }

    fn start_run(&mut self) -> Result<(), SinkError> {
        let state = self.state.clone();

        let run_id = match self.config.run.id {
            Some(run_id) => {
                if !self.service.run_exists(&self.project, run_id) {
                    error!(run_id, project = %self.project, "Run not found");
                    return Err(SinkError::RunNotFound(run_id));
                }
                state.start_assigned_run(run_id)?
            }
            None => state.start_run(|| self.create_new_run())?,
        };

        info!(run_id, project = %self.project, "TestOps run started");
        self.run_id = Some(run_id);
        Ok(())
    }

    fn complete_run(&mut self) -> Result<(), SinkError> {
        self.send_results()?;

        let run_id = self.run_id.ok_or(SinkError::NotStarted)?;
        if !self.config.run.complete {
            debug!(run_id, "Run completion is disabled");
            self.state.release_run()?;
            self.run_id = None;
            return Ok(());
        }

        let service = Arc::clone(&self.service);
        let project = self.project.clone();
        let completed = self.state.complete_run(|| {
            service.complete_run(&project, run_id);
            Ok::<_, SinkError>(())
        })?;
        self.run_id = None;

        if completed {
            self.show_public_report(run_id);
        }
        Ok(())
    }

    fn add_result(&mut self, result: TestResult) -> Result<(), SinkError> {
        if !self.should_include(&result) {
            debug!(title = %result.title, "Result excluded by status filter");
            return Ok(());
        }

        self.results.push(result);
        if self.results.len() >= self.batch_size() {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn send_results(&mut self) -> Result<(), SinkError> {
        while !self.results.is_empty() {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn abandon(&mut self) -> Result<(), SinkError> {
        let Some(run_id) = self.run_id.take() else {
            return Ok(());
        };
        self.state.release_run()?;
        info!(run_id, "Left TestOps run without completing it");
        Ok(())
    }

    fn take_results(&mut self) -> Vec<TestResult> {
        std::mem::take(&mut self.results)
    }

    fn set_results(&mut self, results: Vec<TestResult>) {
        self.results = results;
    }

    fn results(&self) -> &[TestResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationValue;
    use crate::testing::{MockReportingService, ServiceCall};
    use tempfile::TempDir;
    use testops_proto::{ExternalLinkType, Status};

    fn sink_with(temp: &TempDir, mock: &MockReportingService, config: TestOpsConfig) -> TestOpsSink {
        let state = RunStateStore::new(temp.path().join("testops-run.json"));
        TestOpsSink::new(Arc::new(mock.clone()), "DEMO", config, state)
    }

    fn batch_config(size: usize) -> TestOpsConfig {
        let mut config = TestOpsConfig::default();
        config.batch.size = size;
        config
    }

    #[test]
    fn test_start_run_creates_run_once() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new().with_run_id(77);
        let mut first = sink_with(&temp, &mock, TestOpsConfig::default());
        let mut second = sink_with(&temp, &mock, TestOpsConfig::default());

        first.start_run().unwrap();
        second.start_run().unwrap();

        assert_eq!(first.run_id(), Some(77));
        assert_eq!(second.run_id(), Some(77));
        assert_eq!(mock.created_runs().len(), 1);
    }

    #[test]
    fn test_preassigned_run_must_exist() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut config = TestOpsConfig::default();
        config.run.id = Some(404);
        let mut sink = sink_with(&temp, &mock, config);

        assert!(matches!(sink.start_run(), Err(SinkError::RunNotFound(404))));
        assert!(mock.created_runs().is_empty());
    }

    #[test]
    fn test_preassigned_run_is_reused() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new().with_existing_run(12);
        let mut config = TestOpsConfig::default();
        config.run.id = Some(12);
        let mut sink = sink_with(&temp, &mock, config);

        sink.start_run().unwrap();

        assert_eq!(sink.run_id(), Some(12));
        assert!(mock.created_runs().is_empty());
    }

    #[test]
    fn test_create_run_resolves_environment_and_link() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new()
            .with_run_id(5)
            .with_environment("staging", 3);
        let mut config = TestOpsConfig::default();
        config.run.title = Some("Nightly".to_string());
        config.run.tags = vec!["smoke".to_string()];
        config.plan.id = Some(8);
        config.run.external_link.link_type = Some(ExternalLinkType::JiraServer);
        config.run.external_link.link = Some("PROJ-7".to_string());
        let mut sink =
            sink_with(&temp, &mock, config).with_environment(Some("staging".to_string()));

        sink.start_run().unwrap();

        let runs = mock.created_runs();
        assert_eq!(runs[0].title, "Nightly");
        assert_eq!(runs[0].environment_id, Some(3));
        assert_eq!(runs[0].plan_id, Some(8));
        assert_eq!(runs[0].tags, vec!["smoke"]);
        assert!(mock.calls().contains(&ServiceCall::UpdateExternalIssue {
            link_type: ExternalLinkType::JiraServer,
            run_id: 5,
            issue: "PROJ-7".to_string(),
        }));
    }

    #[test]
    fn test_external_link_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new().with_run_id(5);
        mock.fail_external_links(true);
        let mut config = TestOpsConfig::default();
        config.run.external_link.link_type = Some(ExternalLinkType::JiraCloud);
        config.run.external_link.link = Some("PROJ-1".to_string());
        let mut sink = sink_with(&temp, &mock, config);

        assert!(sink.start_run().is_ok());
    }

    #[test]
    fn test_add_result_flushes_full_batch_only() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut sink = sink_with(&temp, &mock, batch_config(3));
        sink.start_run().unwrap();

        for i in 0..2 {
            sink.add_result(TestResult::new(format!("t{}", i))).unwrap();
        }
        assert!(mock.sent_batches().is_empty());

        sink.add_result(TestResult::new("t2")).unwrap();
        assert_eq!(mock.sent_batches().len(), 1);
        assert!(sink.results().is_empty());
    }

    #[test]
    fn test_status_filter_keeps_unknown_status() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut config = TestOpsConfig::default();
        config.status_filter = vec![Status::Skipped, Status::Blocked];
        let mut sink = sink_with(&temp, &mock, config);
        sink.start_run().unwrap();

        for status in [Status::Passed, Status::Skipped, Status::Blocked, Status::Failed] {
            sink.add_result(TestResult::new(status.as_str()).with_status(status))
                .unwrap();
        }
        sink.add_result(TestResult::new("no status")).unwrap();
        sink.send_results().unwrap();

        let titles: Vec<String> = mock
            .sent_batches()
            .concat()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["passed", "failed", "no status"]);
    }

    #[test]
    fn test_failed_batch_stays_buffered() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut sink = sink_with(&temp, &mock, batch_config(2));
        sink.start_run().unwrap();
        mock.fail_send_results(true);

        sink.add_result(TestResult::new("a")).unwrap();
        let err = sink.add_result(TestResult::new("b"));

        assert!(matches!(err, Err(SinkError::Service(_))));
        assert_eq!(sink.results().len(), 2);
    }

    #[test]
    fn test_add_before_start_is_not_started() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut sink = sink_with(&temp, &mock, batch_config(1));

        let result = sink.add_result(TestResult::new("a"));
        assert!(matches!(result, Err(SinkError::NotStarted)));
    }

    #[test]
    fn test_complete_run_respects_complete_flag() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut config = TestOpsConfig::default();
        config.run.complete = false;
        let mut sink = sink_with(&temp, &mock, config);
        sink.start_run().unwrap();
        sink.add_result(TestResult::new("a")).unwrap();

        sink.complete_run().unwrap();

        assert_eq!(mock.sent_batches().len(), 1);
        assert!(mock.completed_runs().is_empty());
    }

    #[test]
    fn test_complete_run_enables_public_report() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new().with_run_id(9);
        let mut config = TestOpsConfig::default();
        config.show_public_report_link = true;
        let mut sink = sink_with(&temp, &mock, config);
        sink.start_run().unwrap();

        sink.complete_run().unwrap();

        assert_eq!(mock.completed_runs(), vec![9]);
        assert!(mock.calls().contains(&ServiceCall::EnablePublicReport { run_id: 9 }));
    }

    #[test]
    fn test_prepare_configurations_uses_cache_and_creates() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new().with_configuration_group(
            ConfigurationGroup::new(1, "browser").with_item(10, "chrome"),
        );
        let mut config = TestOpsConfig::default();
        config.configurations.create_if_not_exists = true;
        config.configurations.values = vec![
            ConfigurationValue { name: "browser".into(), value: "chrome".into() },
            ConfigurationValue { name: "browser".into(), value: "firefox".into() },
            ConfigurationValue { name: "os".into(), value: "linux".into() },
        ];
        let mut sink = sink_with(&temp, &mock, config);

        sink.start_run().unwrap();

        let listed = mock
            .calls()
            .iter()
            .filter(|c| matches!(c, ServiceCall::ConfigurationGroups))
            .count();
        assert_eq!(listed, 1);
        assert_eq!(mock.created_runs()[0].configurations.len(), 3);
        assert!(mock.calls().contains(&ServiceCall::CreateConfigurationGroup {
            title: "os".to_string()
        }));
    }

    #[test]
    fn test_prepare_configurations_skips_unresolved() {
        let temp = TempDir::new().unwrap();
        let mock = MockReportingService::new();
        let mut config = TestOpsConfig::default();
        config.configurations.values = vec![ConfigurationValue {
            name: "browser".into(),
            value: "chrome".into(),
        }];
        let mut sink = sink_with(&temp, &mock, config);

        sink.start_run().unwrap();

        assert!(mock.created_runs()[0].configurations.is_empty());
    }
}
