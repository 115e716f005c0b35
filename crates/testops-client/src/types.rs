use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Envelope shared by every v1 response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityList<T> {
    #[serde(default = "Vec::new")]
    pub entities: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdResult {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationGroupEntity {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub configurations: Vec<ConfigurationEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationEntity {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentHash {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicReport {
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRunRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<i64>,
    pub is_autotest: bool,
    /// UTC, formatted `YYYY-MM-DD HH:MM:SS`.
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateConfigurationGroupRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateConfigurationRequest {
    pub title: String,
    pub group_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalIssuesRequest {
    #[serde(rename = "type")]
    pub link_type: String,
    pub links: Vec<ExternalIssueLinkRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalIssueLinkRequest {
    pub run_id: i64,
    pub external_issue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicReportRequest {
    pub status: bool,
}

// v2 bulk results

#[derive(Debug, Clone, Serialize)]
pub struct CreateResultsRequest {
    pub results: Vec<ResultCreate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCreate {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testops_ids: Option<Vec<i64>>,
    pub execution: ResultExecutionCreate,
    pub fields: BTreeMap<String, String>,
    pub attachments: Vec<String>,
    pub steps: Vec<ResultStepCreate>,
    pub params: BTreeMap<String, String>,
    pub param_groups: Vec<Vec<String>>,
    pub relations: ResultRelationsCreate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub defect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultExecutionCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStepCreate {
    pub data: ResultStepDataCreate,
    pub execution: ResultStepExecutionCreate,
    pub steps: Vec<ResultStepCreate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStepDataCreate {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStepExecutionCreate {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRelationsCreate {
    pub suite: RelationSuite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationSuite {
    pub data: Vec<RelationSuiteItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationSuiteItem {
    pub title: String,
}
