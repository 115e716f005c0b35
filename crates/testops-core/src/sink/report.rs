//! Per-result JSON written under `results/` by the file sink.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};
use testops_proto::{Attachment, Relations, Step, TestResult};

fn or_empty(value: &str) -> &str {
    if value.is_empty() { "empty" } else { value }
}

pub fn result_to_report(result: &TestResult) -> Value {
    let execution = &result.execution;

    let params = if result.params.is_empty() {
        Value::Object(Map::new())
    } else {
        result
            .params
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": or_empty(value) }))
            .collect()
    };

    let param_groups: Vec<Vec<&str>> = result
        .param_groups
        .iter()
        .map(|group| group.iter().map(|v| or_empty(v)).collect())
        .collect();

    json!({
        "id": result.id,
        "title": result.title,
        "message": result.message.as_deref().filter(|m| !m.is_empty()),
        "muted": result.muted,
        "signature": result.signature,
        "fields": result.fields,
        "params": params,
        "param_groups": param_groups,
        "testops_id": result.testops_ids.as_ref().and_then(|ids| ids.first()),
        "testops_ids": result.testops_ids,
        "execution": {
            "status": execution.status,
            "start_time": execution.start_time,
            "end_time": execution.end_time,
            "duration": execution.duration,
            "stacktrace": execution.stacktrace,
            "thread": execution.thread,
        },
        "attachments": result.attachments.iter().map(attachment_to_report).collect::<Vec<_>>(),
        "steps": result.steps.iter().map(step_to_report).collect::<Vec<_>>(),
        "relations": relations_to_report(&result.relations),
    })
}

fn attachment_to_report(attachment: &Attachment) -> Value {
    json!({
        "content": attachment.content.as_ref().map(|bytes| STANDARD.encode(bytes)),
        "file_name": attachment.title,
        "file_path": attachment.path,
        "mime_type": attachment.mime,
        "size": attachment.content.as_ref().map(Vec::len),
        "id": Value::Null,
    })
}

fn step_to_report(step: &Step) -> Value {
    json!({
        "id": step.id,
        "step_type": step.step_type,
        "data": {
            "action": step.data.action,
            "expected_result": step.data.expected_result,
            "input_data": step.data.input_data,
            "parent_id": step.parent_id,
        },
        "execution": {
            "status": step.execution.status,
            "start_time": step.execution.start_time,
            "duration": step.execution.duration,
            "end_time": step.execution.end_time,
        },
        "attachments": step.attachments.iter().map(attachment_to_report).collect::<Vec<_>>(),
        "steps": step.steps.iter().map(step_to_report).collect::<Vec<_>>(),
    })
}

fn relations_to_report(relations: &Relations) -> Value {
    if relations.suite.data.is_empty() {
        return Value::Null;
    }
    let data: Vec<Value> = relations
        .suite
        .data
        .iter()
        .map(|item| json!({ "title": item.title, "public_id": item.public_id }))
        .collect();
    json!({ "suite": { "data": data } })
}
