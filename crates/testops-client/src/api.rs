use crate::attachments::{filter_valid, split_into_batches};
use crate::config::{ClientConfig, ClientInfo};
use crate::convert::to_result_create;
use crate::error::{ClientError, Result};
use crate::headers::{x_client, x_platform};
use crate::types::*;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;
use testops_proto::{
    Attachment, ConfigurationGroup, ConfigurationItem, ExternalIssueLink, ExternalLinkType,
    ReportingService, RunCreate, ServiceError, TestResult,
};
use tracing::{debug, error, info, warn};

/// Blocking client for the TestOps v1 and v2 APIs.
pub struct TestOpsApi {
    client: Client,
    config: ClientConfig,
    v1_url: String,
    v2_url: String,
    v2_headers: HeaderMap,
}

impl TestOpsApi {
    pub fn new(config: ClientConfig, info: ClientInfo) -> Result<Self> {
        if config.token.is_empty() {
            return Err(ClientError::ConfigError("API token is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let mut v2_headers = HeaderMap::new();
        if let Some(value) = x_client(&info).and_then(|v| HeaderValue::from_str(&v).ok()) {
            v2_headers.insert("X-Client", value);
        }
        if let Ok(value) = HeaderValue::from_str(&x_platform()) {
            v2_headers.insert("X-Platform", value);
        }

        Ok(Self {
            client,
            v1_url: config.api_url(1),
            v2_url: config.api_url(2),
            config,
            v2_headers,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn v1(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("accept", "application/json")
            .header("Token", &self.config.token)
    }

    fn send(builder: RequestBuilder, action: &str) -> Result<Response> {
        let response = builder.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                body: format!("Failed to {}: {}", action, body),
            });
        }
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(builder: RequestBuilder, action: &str) -> Result<T> {
        let response = Self::send(builder, action)?;
        let envelope: ApiResponse<T> = response.json()?;
        envelope
            .result
            .ok_or_else(|| ClientError::MissingField("result".to_string()))
    }

    pub fn try_project_exists(&self, code: &str) -> Result<bool> {
        debug!("Check project exist: {}", code);
        let url = format!("{}/project/{}", self.v1_url, code);
        let response = self.v1(self.client.get(&url)).send()?;
        Ok(response.status().is_success())
    }

    pub fn try_resolve_environment_id(&self, code: &str, name: &str) -> Result<Option<i64>> {
        debug!("Get environment: {}", name);
        let url = format!("{}/environment/{}", self.v1_url, code);
        let request = self
            .v1(self.client.get(&url))
            .query(&[("search", name), ("limit", "100")]);

        let list: EntityList<Environment> = Self::send_json(request, "get environments")?;
        Ok(list.entities.into_iter().find(|e| e.slug == name).map(|e| e.id))
    }

    pub fn try_create_run(&self, code: &str, run: &RunCreate) -> Result<i64> {
        debug!("Create test run: {}", run.title);
        let url = format!("{}/run/{}", self.v1_url, code);
        let body = CreateRunRequest {
            title: run.title.clone(),
            description: run.description.clone().filter(|d| !d.is_empty()),
            plan_id: run.plan_id,
            environment_id: run.environment_id,
            tags: run.tags.clone(),
            configurations: run.configurations.clone(),
            is_autotest: true,
            start_time: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        let created: IdResult =
            Self::send_json(self.v1(self.client.post(&url)).json(&body), "create test run")?;
        info!("Test run created with id: {}", created.id);
        Ok(created.id)
    }

    pub fn try_complete_run(&self, code: &str, run_id: i64) -> Result<()> {
        debug!("Complete test run: {}", run_id);
        let url = format!("{}/run/{}/{}/complete", self.v1_url, code, run_id);
        Self::send(self.v1(self.client.post(&url)), "complete test run")?;
        info!(
            "Test run link: {}/run/{}/dashboard/{}",
            self.config.app_url(),
            code,
            run_id
        );
        Ok(())
    }

    pub fn try_run_exists(&self, code: &str, run_id: i64) -> Result<bool> {
        debug!("Check test run exist: {}", run_id);
        let url = format!("{}/run/{}/{}", self.v1_url, code, run_id);
        let response = self.v1(self.client.get(&url)).send()?;
        Ok(response.status().is_success())
    }

    pub fn try_send_results(&self, code: &str, run_id: i64, results: &[TestResult]) -> Result<()> {
        debug!(
            "Send {} results to project: {}, run: {}",
            results.len(),
            code,
            run_id
        );

        let mut upload = |attachments: &[Attachment]| self.upload_attachments(code, attachments);
        let body = CreateResultsRequest {
            results: results
                .iter()
                .map(|r| to_result_create(r, self.config.defect, &mut upload))
                .collect(),
        };

        let url = format!("{}/{}/run/{}/results", self.v2_url, code, run_id);
        let request = self
            .v1(self.client.post(&url))
            .headers(self.v2_headers.clone())
            .json(&body);
        Self::send(request, "send results")?;
        Ok(())
    }

    pub fn try_configuration_groups(&self, code: &str) -> Result<Vec<ConfigurationGroup>> {
        debug!("Get configuration groups for project: {}", code);
        let url = format!("{}/configuration/{}", self.v1_url, code);
        let list: EntityList<ConfigurationGroupEntity> =
            Self::send_json(self.v1(self.client.get(&url)), "get configurations")?;

        Ok(list
            .entities
            .into_iter()
            .map(|group| ConfigurationGroup {
                id: group.id,
                title: group.title,
                items: group
                    .configurations
                    .into_iter()
                    .map(|c| ConfigurationItem {
                        id: c.id,
                        title: c.title,
                    })
                    .collect(),
            })
            .collect())
    }

    pub fn try_create_configuration_group(&self, code: &str, title: &str) -> Result<ConfigurationGroup> {
        debug!("Create configuration group: {}", title);
        let url = format!("{}/configuration/{}/group", self.v1_url, code);
        let body = CreateConfigurationGroupRequest {
            title: title.to_string(),
        };
        let created: IdResult = Self::send_json(
            self.v1(self.client.post(&url)).json(&body),
            "create configuration group",
        )?;
        Ok(ConfigurationGroup::new(created.id, title))
    }

    pub fn try_create_configuration_item(
        &self,
        code: &str,
        group_id: i64,
        title: &str,
    ) -> Result<ConfigurationItem> {
        debug!("Create configuration '{}' in group {}", title, group_id);
        let url = format!("{}/configuration/{}", self.v1_url, code);
        let body = CreateConfigurationRequest {
            title: title.to_string(),
            group_id,
        };
        let created: IdResult = Self::send_json(
            self.v1(self.client.post(&url)).json(&body),
            "create configuration",
        )?;
        Ok(ConfigurationItem {
            id: created.id,
            title: title.to_string(),
        })
    }

    pub fn try_update_external_issue_link(
        &self,
        code: &str,
        link_type: ExternalLinkType,
        links: &[ExternalIssueLink],
    ) -> Result<()> {
        let wire_type = match link_type {
            ExternalLinkType::JiraCloud => "jira-cloud",
            ExternalLinkType::JiraServer => "jira-server",
        };
        debug!("Update external issue links ({}) for project: {}", wire_type, code);

        let url = format!("{}/run/{}/external-issue", self.v1_url, code);
        let body = ExternalIssuesRequest {
            link_type: wire_type.to_string(),
            links: links
                .iter()
                .map(|l| ExternalIssueLinkRequest {
                    run_id: l.run_id,
                    external_issue: l.external_issue.clone(),
                })
                .collect(),
        };
        Self::send(
            self.v1(self.client.post(&url)).json(&body),
            "update external issue links",
        )?;
        Ok(())
    }

    fn part_for(attachment: &Attachment) -> Result<Part> {
        let bytes = match (&attachment.content, attachment.path()) {
            (Some(content), _) => content.clone(),
            (None, Some(path)) => std::fs::read(path)?,
            (None, None) => {
                return Err(ClientError::ConfigError(
                    "attachment has neither path nor content".to_string(),
                ));
            }
        };

        let part = Part::bytes(bytes).file_name(attachment.display_name());
        match &attachment.mime {
            Some(mime) => Ok(part.mime_str(mime)?),
            None => Ok(part),
        }
    }

    pub fn try_upload_attachments(&self, code: &str, attachments: &[Attachment]) -> Result<Vec<String>> {
        if attachments.is_empty() {
            warn!("Empty attachments array provided");
            return Ok(Vec::new());
        }
        debug!("Upload {} attachment(s)", attachments.len());

        let valid = filter_valid(attachments);
        if valid.is_empty() {
            warn!("No valid attachments to upload after filtering");
            return Ok(Vec::new());
        }

        let batches = split_into_batches(valid);
        let total = batches.len();
        debug!("Split into {} batch(es)", total);

        let url = format!("{}/attachment/{}", self.v1_url, code);
        let mut hashes = Vec::new();
        for (index, batch) in batches.into_iter().enumerate() {
            debug!(
                "Uploading batch {}/{} with {} file(s)",
                index + 1,
                total,
                batch.len()
            );

            let mut form = Form::new();
            for item in &batch {
                form = form.part("file", Self::part_for(item.attachment)?);
            }

            let uploaded: Vec<AttachmentHash> = Self::send_json(
                self.v1(self.client.post(&url)).multipart(form),
                "upload attachments",
            )?;
            hashes.extend(uploaded.into_iter().map(|a| a.hash));
        }

        Ok(hashes)
    }

    pub fn try_enable_public_report(&self, code: &str, run_id: i64) -> Result<String> {
        let url = format!("{}/run/{}/{}/public", self.v1_url, code, run_id);
        let report: PublicReport = Self::send_json(
            self.v1(self.client.patch(&url))
                .json(&PublicReportRequest { status: true }),
            "enable public report",
        )?;
        Ok(format!("{}/public/report/{}", self.config.app_url(), report.hash))
    }
}

impl ReportingService for TestOpsApi {
    fn project_exists(&self, code: &str) -> bool {
        match self.try_project_exists(code) {
            Ok(found) => {
                debug!("Project {}: {}", if found { "found" } else { "not found" }, code);
                found
            }
            Err(e) => {
                error!("Failed to check project exist: {}", e);
                false
            }
        }
    }

    fn resolve_environment_id(&self, code: &str, name: &str) -> Option<i64> {
        match self.try_resolve_environment_id(code, name) {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                debug!("Environment not found: {}", name);
                None
            }
            Err(e) => {
                error!("Failed to get environment: {}", e);
                None
            }
        }
    }

    fn create_run(&self, code: &str, run: &RunCreate) -> std::result::Result<i64, ServiceError> {
        self.try_create_run(code, run).map_err(ServiceError::from)
    }

    fn complete_run(&self, code: &str, run_id: i64) {
        if let Err(e) = self.try_complete_run(code, run_id) {
            error!("Failed to complete test run: {}", e);
        }
    }

    fn run_exists(&self, code: &str, run_id: i64) -> bool {
        self.try_run_exists(code, run_id).unwrap_or_else(|e| {
            error!("Failed to check test run exist: {}", e);
            false
        })
    }

    fn send_result_batch(
        &self,
        code: &str,
        run_id: i64,
        results: &[TestResult],
    ) -> std::result::Result<(), ServiceError> {
        self.try_send_results(code, run_id, results).map_err(|e| {
            error!("Error send results to project: {}, run: {}: {}", code, run_id, e);
            ServiceError::from(e)
        })
    }

    fn configuration_groups(&self, code: &str) -> Vec<ConfigurationGroup> {
        self.try_configuration_groups(code).unwrap_or_else(|e| {
            error!("Failed to get configuration groups: {}", e);
            Vec::new()
        })
    }

    fn create_configuration_group(&self, code: &str, title: &str) -> Option<ConfigurationGroup> {
        self.try_create_configuration_group(code, title)
            .map_err(|e| error!("Failed to create configuration group '{}': {}", title, e))
            .ok()
    }

    fn create_configuration_item(
        &self,
        code: &str,
        group_id: i64,
        title: &str,
    ) -> Option<ConfigurationItem> {
        self.try_create_configuration_item(code, group_id, title)
            .map_err(|e| error!("Failed to create configuration '{}': {}", title, e))
            .ok()
    }

    fn update_external_issue_link(
        &self,
        code: &str,
        link_type: ExternalLinkType,
        links: &[ExternalIssueLink],
    ) -> std::result::Result<(), ServiceError> {
        self.try_update_external_issue_link(code, link_type, links)
            .map_err(ServiceError::from)
    }

    fn upload_attachments(&self, code: &str, attachments: &[Attachment]) -> Vec<String> {
        self.try_upload_attachments(code, attachments)
            .unwrap_or_else(|e| {
                error!("Failed to upload attachment(s): {}", e);
                Vec::new()
            })
    }

    fn enable_public_report(&self, code: &str, run_id: i64) -> Option<String> {
        self.try_enable_public_report(code, run_id)
            .map_err(|e| warn!("Failed to enable public report for run {}: {}", run_id, e))
            .ok()
    }
}
