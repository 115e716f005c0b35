use crate::attachment::Attachment;
use crate::result::unix_now;
use crate::status::Status;
use serde::{Deserialize, Serialize};

/// One step of a test, possibly with nested steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub step_type: String,
    pub data: StepData,
    pub parent_id: Option<String>,
    pub execution: StepExecution,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepData {
    pub action: Option<String>,
    pub expected_result: Option<String>,
    pub input_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub status: Status,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    /// Milliseconds.
    pub duration: Option<u64>,
}

impl Default for StepExecution {
    fn default() -> Self {
        Self {
            status: Status::Untested,
            start_time: None,
            end_time: None,
            duration: None,
        }
    }
}

impl StepExecution {
    pub fn start(&mut self) {
        self.start_time = Some(unix_now());
    }

    pub fn finish(&mut self, status: Status) {
        let end = unix_now();
        self.status = status;
        self.end_time = Some(end);
        if let Some(start) = self.start_time {
            self.duration = Some(((end - start).max(0.0) * 1000.0) as u64);
        }
    }
}

impl Step {
    /// Creates a text step describing `action`.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_type: "text".to_string(),
            data: StepData {
                action: Some(action.into()),
                ..StepData::default()
            },
            parent_id: None,
            execution: StepExecution::default(),
            attachments: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.execution.status = status;
        self
    }

    pub fn with_expected_result(mut self, expected: impl Into<String>) -> Self {
        self.data.expected_result = Some(expected.into());
        self
    }

    /// Nests `child` under this step, linking it by parent id.
    pub fn add_step(&mut self, mut child: Step) {
        child.parent_id = Some(self.id.clone());
        self.steps.push(child);
    }
}
