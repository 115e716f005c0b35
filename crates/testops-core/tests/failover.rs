//! Fail-over from the TestOps sink to the local report sink.

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use testops_core::config::{Mode, ReporterConfig};
use testops_core::testing::{MockReportingService, ServiceCall};
use testops_core::{FileSink, ReporterFactory, RunStateStore};
use testops_proto::{Status, TestResult};

fn config(temp: &TempDir, batch: usize) -> ReporterConfig {
    let mut config = ReporterConfig {
        mode: Mode::TestOps,
        fallback: Mode::Report,
        root_suite: Some("Nightly".to_string()),
        state_dir: temp.path().join("state"),
        ..ReporterConfig::default()
    };
    config.testops.project = Some("DEMO".to_string());
    config.testops.api.token = Some("secret".to_string());
    config.testops.batch.size = batch;
    config.report.connection.path = temp.path().join("report");
    config
}

fn report_reader(temp: &TempDir) -> FileSink {
    FileSink::new(
        temp.path().join("report"),
        RunStateStore::new(temp.path().join("unused.json")),
    )
}

fn result_files(temp: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(temp.path().join("report").join("results"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn start_failure_switches_to_report() {
    let temp = TempDir::new().unwrap();
    let mock = MockReportingService::new();
    mock.fail_create_run(true);

    let mut reporter = ReporterFactory::new(config(&temp, 10))
        .with_service(Arc::new(mock.clone()))
        .build()
        .unwrap();

    reporter.start_run();
    assert_eq!(reporter.active_sink(), Some("report"));

    reporter.add_result(TestResult::new("login").with_status(Status::Passed));
    reporter.add_result(TestResult::new("logout").with_status(Status::Failed));
    reporter.complete_run();

    let run = report_reader(&temp).read_run().unwrap();
    assert_eq!(run.stats.total, 2);
    assert_eq!(run.stats.passed, 1);
    assert_eq!(run.stats.failed, 1);
    assert!(run.execution.end_time >= run.execution.start_time);
    assert_eq!(result_files(&temp).len(), 2);
    assert!(mock.sent_batches().is_empty());
}

#[test]
fn failed_batch_is_transplanted_into_report() {
    let temp = TempDir::new().unwrap();
    let mock = MockReportingService::new().with_run_id(42);

    let mut reporter = ReporterFactory::new(config(&temp, 2))
        .with_service(Arc::new(mock.clone()))
        .build()
        .unwrap();

    reporter.start_run();
    reporter.add_result(TestResult::new("a").with_status(Status::Passed));
    reporter.add_result(TestResult::new("b").with_status(Status::Passed));
    assert_eq!(mock.sent_batches().len(), 1);

    mock.fail_send_results(true);
    reporter.add_result(TestResult::new("c").with_status(Status::Passed));
    reporter.add_result(TestResult::new("d").with_status(Status::Skipped));

    assert_eq!(reporter.active_sink(), Some("report"));
    let pending: Vec<&str> = reporter
        .pending_results()
        .iter()
        .map(|r| r.title.as_str())
        .collect();
    assert_eq!(pending, vec!["c", "d"]);

    reporter.complete_run();

    let run = report_reader(&temp).read_run().unwrap();
    let titles: Vec<&str> = run.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["c", "d"]);
    assert_eq!(run.stats.skipped, 1);

    let id = &run.results[0].id;
    let written = fs::read_to_string(
        temp.path()
            .join("report")
            .join("results")
            .join(format!("{}.json", id)),
    )
    .unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["relations"]["suite"]["data"][0]["title"], "Nightly");

    // The abandoned TestOps run is never completed by this worker.
    assert!(mock.completed_runs().is_empty());
}

#[test]
fn both_sinks_failing_disables_reporting() {
    let temp = TempDir::new().unwrap();
    let mock = MockReportingService::new();
    mock.fail_create_run(true);

    let mut config = config(&temp, 10);
    config.fallback = Mode::TestOps;

    let mut reporter = ReporterFactory::new(config)
        .with_service(Arc::new(mock.clone()))
        .build()
        .unwrap();

    reporter.start_run();
    reporter.add_result(TestResult::new("lost"));
    reporter.complete_run();

    assert!(reporter.active_sink().is_none());
    assert_eq!(mock.created_runs().len(), 0);
}

fn sent_run_ids(mock: &MockReportingService) -> Vec<i64> {
    mock.calls()
        .into_iter()
        .filter_map(|call| match call {
            ServiceCall::SendResults { run_id, .. } => Some(run_id),
            _ => None,
        })
        .collect()
}

#[test]
fn session_after_fail_over_creates_fresh_run() {
    let temp = TempDir::new().unwrap();

    let first = MockReportingService::new().with_run_id(42);
    first.fail_send_results(true);
    let mut reporter = ReporterFactory::new(config(&temp, 1))
        .with_service(Arc::new(first.clone()))
        .build()
        .unwrap();
    reporter.start_run();
    reporter.add_result(TestResult::new("a").with_status(Status::Passed));
    assert_eq!(reporter.active_sink(), Some("report"));
    reporter.complete_run();

    assert!(!temp.path().join("state").join("testops-run.json").exists());
    assert!(first.completed_runs().is_empty());

    let second = MockReportingService::new().with_run_id(99);
    let mut reporter = ReporterFactory::new(config(&temp, 1))
        .with_service(Arc::new(second.clone()))
        .build()
        .unwrap();
    reporter.start_run();
    reporter.add_result(TestResult::new("b").with_status(Status::Passed));
    reporter.complete_run();

    assert_eq!(reporter.active_sink(), Some("testops"));
    assert_eq!(second.created_runs().len(), 1);
    assert_eq!(sent_run_ids(&second), vec![99]);
    assert_eq!(second.completed_runs(), vec![99]);
}

#[test]
fn assigned_run_id_wins_over_leftover_state() {
    let temp = TempDir::new().unwrap();
    let state_dir = temp.path().join("state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join("testops-run.json"), r#"{"runId":5,"count":1}"#).unwrap();

    let mock = MockReportingService::new().with_existing_run(12);
    let mut config = config(&temp, 10);
    config.testops.run.id = Some(12);
    let mut reporter = ReporterFactory::new(config)
        .with_service(Arc::new(mock.clone()))
        .build()
        .unwrap();

    reporter.start_run();
    reporter.add_result(TestResult::new("a").with_status(Status::Passed));
    reporter.complete_run();

    assert_eq!(reporter.active_sink(), Some("testops"));
    assert!(mock.created_runs().is_empty());
    assert_eq!(sent_run_ids(&mock), vec![12]);
    assert_eq!(mock.completed_runs(), vec![12]);
    assert!(!state_dir.join("testops-run.json").exists());
}
