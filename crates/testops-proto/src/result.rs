use crate::attachment::Attachment;
use crate::status::Status;
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch with sub-second precision.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// One test execution record, as produced by a framework adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// UUID, stable for the lifetime of the result.
    pub id: String,
    pub title: String,
    pub signature: Option<String>,
    pub testops_ids: Option<Vec<i64>>,
    pub execution: ResultExecution,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub param_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub relations: Relations,
    pub message: Option<String>,
    #[serde(default)]
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultExecution {
    /// `None` until the adapter knows the outcome.
    pub status: Option<Status>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    /// Milliseconds.
    pub duration: Option<u64>,
    pub stacktrace: Option<String>,
    pub thread: Option<String>,
}

impl ResultExecution {
    pub fn start(&mut self) {
        self.start_time = Some(unix_now());
    }

    pub fn finish(&mut self) {
        let end = unix_now();
        self.end_time = Some(end);
        if let Some(start) = self.start_time {
            self.duration = Some(((end - start).max(0.0) * 1000.0) as u64);
        }
    }

    /// Appends a stack trace, keeping earlier ones.
    pub fn append_stacktrace(&mut self, trace: &str) {
        match &mut self.stacktrace {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(trace);
            }
            None => self.stacktrace = Some(trace.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relations {
    pub suite: Suite,
}

/// Ordered suite path, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Suite {
    pub data: Vec<SuiteData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteData {
    pub title: String,
    pub public_id: Option<i64>,
}

impl Relations {
    pub fn add_suite(&mut self, title: impl Into<String>) {
        self.suite.data.push(SuiteData {
            title: title.into(),
            public_id: None,
        });
    }

    pub fn suite_titles(&self) -> Vec<&str> {
        self.suite.data.iter().map(|s| s.title.as_str()).collect()
    }

    /// Puts `root` ahead of every existing suite segment.
    pub fn prepend_suite(&mut self, root: impl Into<String>) {
        self.suite.data.insert(
            0,
            SuiteData {
                title: root.into(),
                public_id: None,
            },
        );
    }
}

impl TestResult {
    /// Creates a result with a fresh UUID and a started execution clock.
    pub fn new(title: impl Into<String>) -> Self {
        let mut execution = ResultExecution::default();
        execution.start();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            signature: None,
            testops_ids: None,
            execution,
            fields: BTreeMap::new(),
            attachments: Vec::new(),
            steps: Vec::new(),
            params: BTreeMap::new(),
            param_groups: Vec::new(),
            relations: Relations::default(),
            message: None,
            muted: false,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.execution.status = Some(status);
        self
    }

    pub fn with_suites<I, S>(mut self, suites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for suite in suites {
            self.relations.add_suite(suite);
        }
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn status(&self) -> Option<Status> {
        self.execution.status
    }

    /// Derives and stores the signature from ids, suite path and params.
    pub fn refresh_signature(&mut self) {
        let suites = self.relations.suite_titles();
        let signature = crate::signature::generate_signature(
            self.testops_ids.as_deref(),
            suites.as_slice(),
            &self.params,
        );
        self.signature = Some(signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_result_has_uuid_and_no_status() {
        let result = TestResult::new("login works");
        assert_eq!(result.id.len(), 36);
        assert!(result.status().is_none());
        assert!(result.execution.start_time.is_some());
    }

    #[test]
    fn test_prepend_suite_keeps_existing_order() {
        let mut result = TestResult::new("t").with_suites(["A", "B"]);
        result.relations.prepend_suite("R");
        assert_eq!(result.relations.suite_titles(), vec!["R", "A", "B"]);
    }

    #[test]
    fn test_append_stacktrace_joins_with_newline() {
        let mut execution = ResultExecution::default();
        execution.append_stacktrace("first");
        execution.append_stacktrace("second");
        assert_eq!(execution.stacktrace.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_refresh_signature() {
        let mut result = TestResult::new("t").with_suites(["My Suite"]);
        result.testops_ids = Some(vec![7]);
        result.params.insert("browser".to_string(), "chrome".to_string());
        result.refresh_signature();
        assert_eq!(
            result.signature.as_deref(),
            Some(r#"7::my_suite::{"browser":"chrome"}"#)
        );
    }
}
