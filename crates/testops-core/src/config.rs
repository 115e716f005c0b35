//! Reporter configuration.
//!
//! Settings come from `qase.config.json` in the working directory and are
//! then overridden by `QASE_*` environment variables. Environment keys are
//! matched case-insensitively.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use testops_proto::{ExternalLinkType, Status};
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "qase.config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Error decoding JSON: {0}")]
    Parse(String),

    #[error("TestOps mode requires API token and project to be set")]
    MissingTestOpsCredentials,
}

/// Which sink a reporter writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    TestOps,
    Report,
    #[default]
    Off,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "testops" => Some(Mode::TestOps),
            "report" => Some(Mode::Report),
            "off" => Some(Mode::Off),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::TestOps => "testops",
            Mode::Report => "report",
            Mode::Off => "off",
        }
    }
}

fn lenient_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mode, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Mode::parse).unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReporterConfig {
    #[serde(deserialize_with = "lenient_mode")]
    pub mode: Mode,
    #[serde(deserialize_with = "lenient_mode")]
    pub fallback: Mode,
    pub environment: Option<String>,
    pub root_suite: Option<String>,
    pub debug: bool,
    /// Raw `source -> target` pairs; validated by [`crate::StatusMapping`].
    pub status_mapping: BTreeMap<String, String>,
    /// Directory holding the run-state files shared by worker processes.
    pub state_dir: PathBuf,
    pub testops: TestOpsConfig,
    pub report: ReportConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Off,
            fallback: Mode::Off,
            environment: None,
            root_suite: None,
            debug: false,
            status_mapping: BTreeMap::new(),
            state_dir: PathBuf::from(".testops"),
            testops: TestOpsConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ReporterConfig {
    /// State file used by the remote sink.
    pub fn testops_state_path(&self) -> PathBuf {
        self.state_dir.join("testops-run.json")
    }

    /// State file used by the file sink.
    pub fn report_state_path(&self) -> PathBuf {
        self.state_dir.join("report-run.json")
    }

    fn uses_testops(&self) -> bool {
        self.mode == Mode::TestOps || self.fallback == Mode::TestOps
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uses_testops() {
            let missing = |v: &Option<String>| v.as_deref().is_none_or(str::is_empty);
            if missing(&self.testops.api.token) || missing(&self.testops.project) {
                return Err(ConfigError::MissingTestOpsCredentials);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestOpsConfig {
    pub project: Option<String>,
    pub defect: bool,
    pub api: ApiConfig,
    pub run: RunConfig,
    pub plan: PlanConfig,
    pub batch: BatchConfig,
    pub configurations: ConfigurationsConfig,
    /// Results whose status is listed here are not sent.
    pub status_filter: Vec<Status>,
    pub show_public_report_link: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub token: Option<String>,
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: None,
            host: testops_client::ClientConfig::DEFAULT_HOST.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub complete: bool,
    pub tags: Vec<String>,
    pub external_link: ExternalLinkConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            id: None,
            title: None,
            description: None,
            complete: true,
            tags: Vec::new(),
            external_link: ExternalLinkConfig::default(),
        }
    }
}

impl RunConfig {
    /// Configured title, or `Automated Run <UTC timestamp>`.
    pub fn title_or_default(&self) -> String {
        match self.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => format!(
                "Automated Run {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ExternalLinkConfig {
    #[serde(rename = "type")]
    pub link_type: Option<ExternalLinkType>,
    pub link: Option<String>,
}

impl ExternalLinkConfig {
    /// Both halves of the link, if configured.
    pub fn resolved(&self) -> Option<(ExternalLinkType, &str)> {
        let link = self.link.as_deref().filter(|l| !l.is_empty())?;
        Some((self.link_type?, link))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { size: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigurationsConfig {
    pub values: Vec<ConfigurationValue>,
    pub create_if_not_exists: bool,
}

/// A `group = item` pair such as `browser = chrome`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigurationValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub driver: String,
    pub connection: ConnectionConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            driver: "local".to_string(),
            connection: ConnectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub path: PathBuf,
    pub format: ReportFormat,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./build/qase-report"),
            format: ReportFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Jsonp,
}

/// Loads [`ReporterConfig`] from file and environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `qase.config.json` from the current directory plus the process
    /// environment.
    pub fn load() -> Result<ReporterConfig, ConfigError> {
        let path = std::env::current_dir()?.join(CONFIG_FILE_NAME);
        Self::load_from(&path, std::env::vars())
    }

    /// Reads `path` (if it exists) and applies overrides from `env`.
    pub fn load_from<I, K, V>(path: &Path, env: I) -> Result<ReporterConfig, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::read_file(path)?;
        for (key, value) in env {
            apply_env(&mut config, key.as_ref(), value.as_ref());
        }
        config.testops.batch.size = config.testops.batch.size.max(1);

        debug!(
            mode = config.mode.as_str(),
            fallback = config.fallback.as_str(),
            "Loaded configuration: {:?}",
            redacted(&config)
        );

        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<ReporterConfig, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReporterConfig::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn redacted(config: &ReporterConfig) -> ReporterConfig {
    let mut copy = config.clone();
    if copy.testops.api.token.is_some() {
        copy.testops.api.token = Some("***".to_string());
    }
    copy
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn comma_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Splits `a=b, c=d` into trimmed pairs, skipping malformed entries.
pub(crate) fn key_value_pairs(value: &str) -> Vec<(&str, &str)> {
    comma_list(value)
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let (k, v) = (k.trim(), v.trim());
            (!k.is_empty() && !v.is_empty()).then_some((k, v))
        })
        .collect()
}

fn set_parsed<T: FromStr>(target: &mut T, key: &str, value: &str) {
    match value.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Ignoring invalid value for {}: {}", key, value),
    }
}

fn set_bool(target: &mut bool, key: &str, value: &str) {
    match parse_bool(value) {
        Some(parsed) => *target = parsed,
        None => warn!("Ignoring invalid boolean for {}: {}", key, value),
    }
}

fn apply_env(config: &mut ReporterConfig, key: &str, value: &str) {
    let key = key.to_ascii_lowercase();

    match key.as_str() {
        "qase_mode" => {
            if let Some(mode) = Mode::parse(value) {
                config.mode = mode;
            }
        }
        "qase_fallback" => {
            if let Some(mode) = Mode::parse(value) {
                config.fallback = mode;
            }
        }
        "qase_environment" => config.environment = Some(value.to_string()),
        "qase_root_suite" => config.root_suite = Some(value.to_string()),
        "qase_debug" => set_bool(&mut config.debug, &key, value),
        "qase_status_mapping" => {
            config.status_mapping = key_value_pairs(value)
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
        "qase_state_dir" => config.state_dir = PathBuf::from(value),

        "qase_testops_project" => config.testops.project = Some(value.to_string()),
        "qase_testops_defect" => set_bool(&mut config.testops.defect, &key, value),
        "qase_testops_api_token" => config.testops.api.token = Some(value.to_string()),
        "qase_testops_api_host" => config.testops.api.host = value.to_string(),
        "qase_testops_run_id" => {
            let mut id = 0;
            set_parsed(&mut id, &key, value);
            if id > 0 {
                config.testops.run.id = Some(id);
            }
        }
        "qase_testops_run_title" => config.testops.run.title = Some(value.to_string()),
        "qase_testops_run_description" => config.testops.run.description = Some(value.to_string()),
        "qase_testops_run_complete" => set_bool(&mut config.testops.run.complete, &key, value),
        "qase_testops_run_tags" => {
            config.testops.run.tags = comma_list(value).map(str::to_string).collect();
        }
        "qase_testops_run_external_link_type" => match ExternalLinkType::parse(value.trim()) {
            Some(link_type) => config.testops.run.external_link.link_type = Some(link_type),
            None => warn!("Ignoring unknown external link type: {}", value),
        },
        "qase_testops_run_external_link_url" => {
            config.testops.run.external_link.link = Some(value.to_string());
        }
        "qase_testops_plan_id" => {
            let mut id = 0;
            set_parsed(&mut id, &key, value);
            if id > 0 {
                config.testops.plan.id = Some(id);
            }
        }
        "qase_testops_batch_size" => set_parsed(&mut config.testops.batch.size, &key, value),
        "qase_testops_configurations_values" => {
            config.testops.configurations.values = key_value_pairs(value)
                .into_iter()
                .map(|(name, value)| ConfigurationValue {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect();
        }
        "qase_testops_configurations_create_if_not_exists" => {
            set_bool(&mut config.testops.configurations.create_if_not_exists, &key, value);
        }
        "qase_testops_status_filter" => {
            config.testops.status_filter = comma_list(value)
                .filter_map(|s| match s.parse::<Status>() {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!("Ignoring status filter entry: {}", e);
                        None
                    }
                })
                .collect();
        }
        "qase_testops_show_public_report_link" => {
            set_bool(&mut config.testops.show_public_report_link, &key, value);
        }

        "qase_report_driver" => config.report.driver = value.to_string(),
        "qase_report_connection_path" => config.report.connection.path = PathBuf::from(value),
        "qase_report_connection_format" => match value.trim().to_ascii_lowercase().as_str() {
            "json" => config.report.connection.format = ReportFormat::Json,
            "jsonp" => config.report.connection.format = ReportFormat::Jsonp,
            _ => warn!("Ignoring unknown report format: {}", value),
        },
        _ => {}
    }
}
