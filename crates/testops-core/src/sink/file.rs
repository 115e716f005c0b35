//! Local JSON report tree.
//!
//! Layout under the configured root:
//!
//! ```text
//! run.json             run summary, short records for every result, stats
//! results/<id>.json    one file per result
//! attachments/         reserved
//! ```
//!
//! `run.json` is shared by every worker writing into the same run and is
//! only touched under `flock()`: shared for reads, exclusive for each
//! read-modify-write.

use super::report::result_to_report;
use super::{Sink, SinkError};
use crate::run_state::RunStateStore;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use testops_proto::{Status, TestResult};
use tracing::{debug, info};

/// Summary of a run as stored in `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDocument {
    pub title: String,
    pub execution: RunExecution,
    pub stats: RunStats,
    #[serde(default)]
    pub results: Vec<ShortResult>,
    #[serde(default)]
    pub threads: Vec<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunExecution {
    /// Unix seconds.
    pub start_time: i64,
    pub end_time: i64,
    /// Wall-clock seconds between start and end.
    pub duration: i64,
    /// Sum of result durations in milliseconds.
    pub cumulative_duration: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub blocked: u64,
    pub invalid: u64,
    pub muted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortResult {
    pub id: String,
    pub title: String,
    pub status: Option<Status>,
    pub duration: u64,
    pub thread: Option<String>,
}

impl RunStats {
    fn track(&mut self, result: &TestResult) {
        self.total += 1;
        match result.status() {
            Some(Status::Passed) => self.passed += 1,
            Some(Status::Failed) => self.failed += 1,
            Some(Status::Skipped) => self.skipped += 1,
            Some(Status::Blocked) => self.blocked += 1,
            Some(Status::Invalid) => self.invalid += 1,
            Some(Status::Untested) | None => {}
        }
        if result.muted {
            self.muted += 1;
        }
    }
}

impl RunDocument {
    pub fn new(title: impl Into<String>, start_time: i64, environment: Option<String>) -> Self {
        Self {
            title: title.into(),
            execution: RunExecution {
                start_time,
                end_time: start_time,
                ..RunExecution::default()
            },
            stats: RunStats::default(),
            results: Vec::new(),
            threads: Vec::new(),
            environment,
        }
    }

    /// Appends short records and folds the results into the aggregates.
    pub fn add_results(&mut self, results: &[TestResult]) {
        for result in results {
            let duration = result.execution.duration.unwrap_or_default();
            let thread = result.execution.thread.clone();

            self.execution.cumulative_duration += duration;
            self.stats.track(result);
            if let Some(name) = &thread
                && !self.threads.contains(name)
            {
                self.threads.push(name.clone());
            }

            self.results.push(ShortResult {
                id: result.id.clone(),
                title: result.title.clone(),
                status: result.status(),
                duration,
                thread,
            });
        }
    }

    pub fn finish(&mut self, end_time: i64) {
        self.execution.end_time = end_time;
        self.execution.duration = end_time - self.execution.start_time;
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Writes the run and its results to a directory tree.
pub struct FileSink {
    root: PathBuf,
    state: RunStateStore,
    environment: Option<String>,
    results: Vec<TestResult>,
    started: bool,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>, state: RunStateStore) -> Self {
        Self {
            root: root.into(),
            state,
            environment: None,
            results: Vec::new(),
            started: false,
        }
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn run_path(&self) -> PathBuf {
        self.root.join("run.json")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join("attachments")
    }

    /// Reads `run.json` under a shared lock.
    pub fn read_run(&self) -> Result<RunDocument, SinkError> {
        with_shared_lock(&self.run_path(), read_document)
    }

    /// Empties (or creates) the root and lays out a fresh tree.
    fn prepare_tree(&self) -> Result<(), SinkError> {
        clear_directory(&self.root)?;
        fs::create_dir_all(self.results_dir())?;
        fs::create_dir_all(self.attachments_dir())?;

        let run = RunDocument::new("Test run", now(), self.environment.clone());
        let json = encode(&run)?;
        fs::write(self.run_path(), json)?;
        debug!(root = %self.root.display(), "Prepared report directory");
        Ok(())
    }

    fn write_result_files(&self) -> Result<(), SinkError> {
        let dir = self.results_dir();
        for result in &self.results {
            let json = encode(&result_to_report(result))?;
            fs::write(dir.join(format!("{}.json", result.id)), json)?;
        }
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "report"
    }

    fn start_run(&mut self) -> Result<(), SinkError> {
        let this = &*self;
        self.state.start_run(|| -> Result<i64, SinkError> {
            this.prepare_tree()?;
            Ok(1)
        })?;
        self.started = true;
        info!(root = %self.root.display(), "Report run started");
        Ok(())
    }

    fn complete_run(&mut self) -> Result<(), SinkError> {
        self.send_results()?;

        let run_path = self.run_path();
        self.state.complete_run(|| -> Result<(), SinkError> {
            with_exclusive_lock(&run_path, |file| {
                let mut run = read_document(file)?;
                run.finish(now());
                write_document(file, &run)
            })?;
            info!("Test run completed");
            Ok(())
        })?;
        self.started = false;
        Ok(())
    }

    fn add_result(&mut self, result: TestResult) -> Result<(), SinkError> {
        self.results.push(result);
        Ok(())
    }

    fn send_results(&mut self) -> Result<(), SinkError> {
        if self.results.is_empty() {
            return Ok(());
        }

        let pending = &self.results;
        with_exclusive_lock(&self.run_path(), |file| {
            let mut run = read_document(file)?;
            run.add_results(pending);
            write_document(file, &run)
        })?;
        self.write_result_files()?;

        debug!(count = self.results.len(), "Wrote results to report");
        self.results.clear();
        Ok(())
    }

    fn abandon(&mut self) -> Result<(), SinkError> {
        if !std::mem::take(&mut self.started) {
            return Ok(());
        }
        self.state.release_run()?;
        Ok(())
    }

    fn take_results(&mut self) -> Vec<TestResult> {
        std::mem::take(&mut self.results)
    }

    fn set_results(&mut self, results: Vec<TestResult>) {
        self.results = results;
    }

    fn results(&self) -> &[TestResult] {
        &self.results
    }
}

fn clear_directory(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> Result<String, SinkError> {
    serde_json::to_string_pretty(value).map_err(|e| SinkError::Encode(e.to_string()))
}

fn read_document(file: &mut File) -> Result<RunDocument, SinkError> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut content)?;
    serde_json::from_str(&content).map_err(|e| {
        SinkError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("run.json is unreadable: {}", e),
        ))
    })
}

fn write_document(file: &mut File, run: &RunDocument) -> Result<(), SinkError> {
    let json = encode(run)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn open_run_file(path: &Path, write: bool) -> Result<File, SinkError> {
    OpenOptions::new()
        .read(true)
        .write(write)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SinkError::NotStarted,
            _ => SinkError::Io(e),
        })
}

#[cfg(unix)]
fn flock_error(errno: nix::errno::Errno) -> SinkError {
    SinkError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("flock failed: {}", errno),
    ))
}

#[cfg(unix)]
fn with_shared_lock<T, F>(path: &Path, f: F) -> Result<T, SinkError>
where
    F: FnOnce(&mut File) -> Result<T, SinkError>,
{
    use nix::fcntl::{Flock, FlockArg};
    use std::os::fd::AsFd;

    let file = open_run_file(path, false)?;
    let flock =
        Flock::lock(file, FlockArg::LockShared).map_err(|(_, errno)| flock_error(errno))?;

    let owned_fd = flock.as_fd().try_clone_to_owned()?;
    let mut file: File = owned_fd.into();
    f(&mut file)
}

#[cfg(unix)]
fn with_exclusive_lock<T, F>(path: &Path, f: F) -> Result<T, SinkError>
where
    F: FnOnce(&mut File) -> Result<T, SinkError>,
{
    use nix::fcntl::{Flock, FlockArg};
    use std::os::fd::AsFd;

    let file = open_run_file(path, true)?;
    let flock =
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| flock_error(errno))?;

    let owned_fd = flock.as_fd().try_clone_to_owned()?;
    let mut file: File = owned_fd.into();
    f(&mut file)
}

#[cfg(not(unix))]
fn with_shared_lock<T, F>(_path: &Path, _f: F) -> Result<T, SinkError>
where
    F: FnOnce(&mut File) -> Result<T, SinkError>,
{
    Err(crate::run_state::StateError::UnsupportedPlatform.into())
}

#[cfg(not(unix))]
fn with_exclusive_lock<T, F>(_path: &Path, _f: F) -> Result<T, SinkError>
where
    F: FnOnce(&mut File) -> Result<T, SinkError>,
{
    Err(crate::run_state::StateError::UnsupportedPlatform.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sink(temp: &TempDir) -> FileSink {
        let state = RunStateStore::new(temp.path().join("state.json"));
        FileSink::new(temp.path().join("report"), state)
    }

    fn result(title: &str, status: Status, duration: u64) -> TestResult {
        let mut result = TestResult::new(title).with_status(status);
        result.execution.duration = Some(duration);
        result.execution.thread = Some("worker-1".to_string());
        result
    }

    #[test]
    fn test_start_creates_missing_tree() {
        let temp = TempDir::new().unwrap();
        let mut sink = sink(&temp);

        sink.start_run().unwrap();

        assert!(sink.results_dir().is_dir());
        assert!(sink.attachments_dir().is_dir());
        let run = sink.read_run().unwrap();
        assert_eq!(run.title, "Test run");
        assert_eq!(run.stats, RunStats::default());
    }

    #[test]
    fn test_start_clears_previous_report() {
        let temp = TempDir::new().unwrap();
        let stale = temp.path().join("report").join("results").join("old.json");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "{}").unwrap();

        let mut sink = sink(&temp);
        sink.start_run().unwrap();

        assert!(!stale.exists());
    }

    #[test]
    fn test_add_result_does_no_io() {
        let temp = TempDir::new().unwrap();
        let mut sink = sink(&temp);
        sink.start_run().unwrap();

        sink.add_result(result("a", Status::Passed, 10)).unwrap();

        assert_eq!(sink.results().len(), 1);
        assert!(sink.read_run().unwrap().results.is_empty());
    }

    #[test]
    fn test_send_results_updates_run_and_writes_files() {
        let temp = TempDir::new().unwrap();
        let mut sink = sink(&temp);
        sink.start_run().unwrap();

        let first = result("a", Status::Passed, 10);
        let first_id = first.id.clone();
        sink.add_result(first).unwrap();
        sink.add_result(result("b", Status::Failed, 5)).unwrap();
        sink.send_results().unwrap();
        sink.send_results().unwrap();

        let run = sink.read_run().unwrap();
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.stats.total, 2);
        assert_eq!(run.stats.passed, 1);
        assert_eq!(run.stats.failed, 1);
        assert_eq!(run.execution.cumulative_duration, 15);
        assert_eq!(run.threads, vec!["worker-1"]);
        assert!(sink.results().is_empty());

        let file = sink.results_dir().join(format!("{}.json", first_id));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(written["title"], "a");
        assert_eq!(written["execution"]["status"], "passed");
    }

    #[test]
    fn test_complete_run_sets_end_time() {
        let temp = TempDir::new().unwrap();
        let mut sink = sink(&temp);
        sink.start_run().unwrap();
        sink.add_result(result("a", Status::Skipped, 1)).unwrap();

        sink.complete_run().unwrap();

        let run = sink.read_run().unwrap();
        assert_eq!(run.stats.skipped, 1);
        assert!(run.execution.end_time >= run.execution.start_time);
        assert_eq!(
            run.execution.duration,
            run.execution.end_time - run.execution.start_time
        );
        assert!(!temp.path().join("state.json").exists());
    }

    #[test]
    fn test_send_before_start_is_not_started() {
        let temp = TempDir::new().unwrap();
        let mut sink = sink(&temp);
        sink.add_result(result("a", Status::Passed, 1)).unwrap();

        assert!(matches!(sink.send_results(), Err(SinkError::NotStarted)));
        assert_eq!(sink.results().len(), 1);
    }

    #[test]
    fn test_second_worker_does_not_clear_tree() {
        let temp = TempDir::new().unwrap();
        let mut first = sink(&temp);
        let mut second = sink(&temp);

        first.start_run().unwrap();
        first.add_result(result("a", Status::Passed, 1)).unwrap();
        first.send_results().unwrap();
        second.start_run().unwrap();
        second.add_result(result("b", Status::Passed, 1)).unwrap();
        second.send_results().unwrap();

        assert_eq!(first.read_run().unwrap().results.len(), 2);
    }
}
