use crate::attachment::Attachment;
use crate::configuration::{ConfigurationGroup, ConfigurationItem};
use crate::error::ServiceError;
use crate::result::TestResult;
use serde::{Deserialize, Serialize};

/// Parameters for creating a run on the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunCreate {
    pub title: String,
    pub description: Option<String>,
    pub plan_id: Option<i64>,
    pub environment_id: Option<i64>,
    pub tags: Vec<String>,
    pub configurations: Vec<i64>,
}

/// Issue tracker flavour of an external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalLinkType {
    #[serde(rename = "jiraCloud")]
    JiraCloud,
    #[serde(rename = "jiraServer")]
    JiraServer,
}

impl ExternalLinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExternalLinkType::JiraCloud => "jiraCloud",
            ExternalLinkType::JiraServer => "jiraServer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "jiraCloud" => Some(ExternalLinkType::JiraCloud),
            "jiraServer" => Some(ExternalLinkType::JiraServer),
            _ => None,
        }
    }
}

/// Associates a run with an issue in an external tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIssueLink {
    pub run_id: i64,
    pub external_issue: String,
}

/// The remote test-management service a remote sink reports into.
///
/// Calls are blocking. Lookups that cannot change the outcome of a run
/// (existence checks, listings) report failure as `false`/`None`/empty and
/// log; calls that carry results or create state return `Err`.
pub trait ReportingService: Send + Sync {
    fn project_exists(&self, code: &str) -> bool;

    /// Finds an environment whose slug equals `name` exactly.
    fn resolve_environment_id(&self, code: &str, name: &str) -> Option<i64>;

    fn create_run(&self, code: &str, run: &RunCreate) -> Result<i64, ServiceError>;

    /// Failures are logged by the implementation, never returned.
    fn complete_run(&self, code: &str, run_id: i64);

    fn run_exists(&self, code: &str, run_id: i64) -> bool;

    fn send_result_batch(
        &self,
        code: &str,
        run_id: i64,
        results: &[TestResult],
    ) -> Result<(), ServiceError>;

    fn configuration_groups(&self, code: &str) -> Vec<ConfigurationGroup>;

    fn create_configuration_group(&self, code: &str, title: &str) -> Option<ConfigurationGroup>;

    fn create_configuration_item(
        &self,
        code: &str,
        group_id: i64,
        title: &str,
    ) -> Option<ConfigurationItem>;

    fn update_external_issue_link(
        &self,
        code: &str,
        link_type: ExternalLinkType,
        links: &[ExternalIssueLink],
    ) -> Result<(), ServiceError>;

    /// Uploads what it can and returns the hashes of uploaded files.
    ///
    /// Invalid or oversized attachments are skipped with a warning.
    fn upload_attachments(&self, code: &str, attachments: &[Attachment]) -> Vec<String>;

    /// Returns the public report URL, or `None` if it could not be enabled.
    fn enable_public_report(&self, code: &str, run_id: i64) -> Option<String>;
}
