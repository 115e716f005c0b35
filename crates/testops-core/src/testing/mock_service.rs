//! In-memory reporting service for deterministic testing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use testops_proto::{
    Attachment, ConfigurationGroup, ConfigurationItem, ExternalIssueLink, ExternalLinkType,
    ReportingService, RunCreate, ServiceError, TestResult,
};

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    ProjectExists,
    ResolveEnvironment { name: String },
    CreateRun(RunCreate),
    CompleteRun { run_id: i64 },
    RunExists { run_id: i64 },
    SendResults { run_id: i64, count: usize },
    ConfigurationGroups,
    CreateConfigurationGroup { title: String },
    CreateConfigurationItem { group_id: i64, title: String },
    UpdateExternalIssue {
        link_type: ExternalLinkType,
        run_id: i64,
        issue: String,
    },
    UploadAttachments { count: usize },
    EnablePublicReport { run_id: i64 },
}

/// Mock service that records every call and answers from canned state.
///
/// Clones share state, so a test can hand one clone to a sink and inspect
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockReportingService {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    next_run_id: Option<i64>,
    existing_runs: BTreeSet<i64>,
    environments: BTreeMap<String, i64>,
    groups: Vec<ConfigurationGroup>,
    next_configuration_id: i64,
    fail_create_run: bool,
    fail_send_results: bool,
    fail_external_links: bool,
    calls: Vec<ServiceCall>,
    created_runs: Vec<RunCreate>,
    completed_runs: Vec<i64>,
    sent_batches: Vec<Vec<TestResult>>,
}

impl MockReportingService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ServiceCall) {
        self.state().calls.push(call);
    }

    /// Id returned by the next `create_run` calls (default 1).
    pub fn with_run_id(self, run_id: i64) -> Self {
        self.state().next_run_id = Some(run_id);
        self
    }

    pub fn with_existing_run(self, run_id: i64) -> Self {
        self.state().existing_runs.insert(run_id);
        self
    }

    pub fn with_environment(self, slug: impl Into<String>, id: i64) -> Self {
        self.state().environments.insert(slug.into(), id);
        self
    }

    pub fn with_configuration_group(self, group: ConfigurationGroup) -> Self {
        self.state().groups.push(group);
        self
    }

    pub fn fail_create_run(&self, fail: bool) {
        self.state().fail_create_run = fail;
    }

    pub fn fail_send_results(&self, fail: bool) {
        self.state().fail_send_results = fail;
    }

    pub fn fail_external_links(&self, fail: bool) {
        self.state().fail_external_links = fail;
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state().calls.clone()
    }

    pub fn created_runs(&self) -> Vec<RunCreate> {
        self.state().created_runs.clone()
    }

    pub fn completed_runs(&self) -> Vec<i64> {
        self.state().completed_runs.clone()
    }

    /// Every delivered batch, in delivery order.
    pub fn sent_batches(&self) -> Vec<Vec<TestResult>> {
        self.state().sent_batches.clone()
    }

    fn next_configuration_id(state: &mut MockState) -> i64 {
        state.next_configuration_id += 1;
        1000 + state.next_configuration_id
    }
}

impl ReportingService for MockReportingService {
    fn project_exists(&self, _code: &str) -> bool {
        self.record(ServiceCall::ProjectExists);
        true
    }

    fn resolve_environment_id(&self, _code: &str, name: &str) -> Option<i64> {
        self.record(ServiceCall::ResolveEnvironment {
            name: name.to_string(),
        });
        self.state().environments.get(name).copied()
    }

    fn create_run(&self, _code: &str, run: &RunCreate) -> Result<i64, ServiceError> {
        self.record(ServiceCall::CreateRun(run.clone()));
        let mut state = self.state();
        if state.fail_create_run {
            return Err(ServiceError::Transport("connection refused".to_string()));
        }
        let run_id = state.next_run_id.unwrap_or(1);
        state.existing_runs.insert(run_id);
        state.created_runs.push(run.clone());
        Ok(run_id)
    }

    fn complete_run(&self, _code: &str, run_id: i64) {
        self.record(ServiceCall::CompleteRun { run_id });
        self.state().completed_runs.push(run_id);
    }

    fn run_exists(&self, _code: &str, run_id: i64) -> bool {
        self.record(ServiceCall::RunExists { run_id });
        self.state().existing_runs.contains(&run_id)
    }

    fn send_result_batch(
        &self,
        _code: &str,
        run_id: i64,
        results: &[TestResult],
    ) -> Result<(), ServiceError> {
        self.record(ServiceCall::SendResults {
            run_id,
            count: results.len(),
        });
        let mut state = self.state();
        if state.fail_send_results {
            return Err(ServiceError::Api {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        state.sent_batches.push(results.to_vec());
        Ok(())
    }

    fn configuration_groups(&self, _code: &str) -> Vec<ConfigurationGroup> {
        self.record(ServiceCall::ConfigurationGroups);
        self.state().groups.clone()
    }

    fn create_configuration_group(&self, _code: &str, title: &str) -> Option<ConfigurationGroup> {
        self.record(ServiceCall::CreateConfigurationGroup {
            title: title.to_string(),
        });
        let mut state = self.state();
        let group = ConfigurationGroup::new(Self::next_configuration_id(&mut state), title);
        state.groups.push(group.clone());
        Some(group)
    }

    fn create_configuration_item(
        &self,
        _code: &str,
        group_id: i64,
        title: &str,
    ) -> Option<ConfigurationItem> {
        self.record(ServiceCall::CreateConfigurationItem {
            group_id,
            title: title.to_string(),
        });
        let mut state = self.state();
        let item = ConfigurationItem {
            id: Self::next_configuration_id(&mut state),
            title: title.to_string(),
        };
        let group = state.groups.iter_mut().find(|g| g.id == group_id)?;
        group.items.push(item.clone());
        Some(item)
    }

    fn update_external_issue_link(
        &self,
        _code: &str,
        link_type: ExternalLinkType,
        links: &[ExternalIssueLink],
    ) -> Result<(), ServiceError> {
        for link in links {
            self.record(ServiceCall::UpdateExternalIssue {
                link_type,
                run_id: link.run_id,
                issue: link.external_issue.clone(),
            });
        }
        if self.state().fail_external_links {
            return Err(ServiceError::Api {
                status: 400,
                message: "unknown issue".to_string(),
            });
        }
        Ok(())
    }

    fn upload_attachments(&self, _code: &str, attachments: &[Attachment]) -> Vec<String> {
        self.record(ServiceCall::UploadAttachments {
            count: attachments.len(),
        });
        attachments
            .iter()
            .filter(|a| a.validate().is_ok())
            .map(|a| format!("hash-{}", a.display_name()))
            .collect()
    }

    fn enable_public_report(&self, _code: &str, run_id: i64) -> Option<String> {
        self.record(ServiceCall::EnablePublicReport { run_id });
        Some(format!("https://app.qase.io/public/report/run-{}", run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls_and_batches() {
        let mock = MockReportingService::new().with_run_id(4);
        let service: &dyn ReportingService = &mock;

        let run_id = service.create_run("P", &RunCreate::default()).unwrap();
        service
            .send_result_batch("P", run_id, &[TestResult::new("a")])
            .unwrap();

        assert_eq!(run_id, 4);
        assert!(service.run_exists("P", 4));
        assert_eq!(mock.sent_batches().len(), 1);
        assert_eq!(mock.calls().len(), 3);
    }

    #[test]
    fn test_mock_failure_switches() {
        let mock = MockReportingService::new();
        mock.fail_create_run(true);
        mock.fail_send_results(true);

        assert!(mock.create_run("P", &RunCreate::default()).is_err());
        assert!(mock.send_result_batch("P", 1, &[]).is_err());
        assert!(mock.created_runs().is_empty());
    }

    #[test]
    fn test_mock_clones_share_state() {
        let mock = MockReportingService::new();
        let clone = mock.clone();
        clone.complete_run("P", 2);
        assert_eq!(mock.completed_runs(), vec![2]);
    }
}
