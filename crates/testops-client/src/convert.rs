//! Conversion of domain results into the v2 wire shape.
//!
//! Attachments are resolved through a caller-supplied upload function so the
//! mapping can be exercised without a server.

use crate::types::{
    RelationSuite, RelationSuiteItem, ResultCreate, ResultExecutionCreate, ResultRelationsCreate,
    ResultStepCreate, ResultStepDataCreate, ResultStepExecutionCreate,
};
use testops_proto::{Attachment, Relations, Step, TestResult};

pub fn to_result_create<U>(result: &TestResult, defect: bool, upload: &mut U) -> ResultCreate
where
    U: FnMut(&[Attachment]) -> Vec<String>,
{
    let execution = &result.execution;

    ResultCreate {
        id: result.id.clone(),
        title: result.title.clone(),
        signature: result.signature.clone(),
        testops_ids: result.testops_ids.clone(),
        execution: ResultExecutionCreate {
            status: execution.status.map(|s| s.as_str().to_string()),
            start_time: execution.start_time,
            end_time: execution.end_time,
            duration: execution.duration,
            stacktrace: execution.stacktrace.clone(),
            thread: execution.thread.clone(),
        },
        fields: result.fields.clone(),
        attachments: upload_all(&result.attachments, upload),
        steps: result
            .steps
            .iter()
            .map(|step| to_step_create(step, upload))
            .collect(),
        params: result.params.clone(),
        param_groups: result.param_groups.clone(),
        relations: to_relations(&result.relations),
        message: result.message.clone(),
        defect,
    }
}

fn to_step_create<U>(step: &Step, upload: &mut U) -> ResultStepCreate
where
    U: FnMut(&[Attachment]) -> Vec<String>,
{
    ResultStepCreate {
        data: ResultStepDataCreate {
            action: step.data.action.clone().unwrap_or_default(),
            expected_result: step.data.expected_result.clone(),
            input_data: step.data.input_data.clone(),
        },
        execution: ResultStepExecutionCreate {
            status: step.execution.status.as_str().to_string(),
            duration: step.execution.duration,
            attachments: upload_all(&step.attachments, upload),
        },
        steps: step
            .steps
            .iter()
            .map(|child| to_step_create(child, upload))
            .collect(),
    }
}

fn upload_all<U>(attachments: &[Attachment], upload: &mut U) -> Vec<String>
where
    U: FnMut(&[Attachment]) -> Vec<String>,
{
    if attachments.is_empty() {
        return Vec::new();
    }
    upload(attachments)
}

fn to_relations(relations: &Relations) -> ResultRelationsCreate {
    ResultRelationsCreate {
        suite: RelationSuite {
            data: relations
                .suite
                .data
                .iter()
                .map(|item| RelationSuiteItem {
                    title: item.title.clone(),
                })
                .collect(),
        },
    }
}
