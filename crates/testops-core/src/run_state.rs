//! Run-state file shared by worker processes reporting into one run.
//!
//! The file holds `{"runId": <id|null>, "count": <n>}` and is only ever read
//! and rewritten under an exclusive `flock()`. The first worker to start
//! creates the run; the worker that brings the count back to zero completes
//! it and removes the file.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode run state: {0}")]
    Encode(String),

    #[error("Run state locking is not supported on this platform")]
    UnsupportedPlatform,
}

/// Persisted contents of the run-state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: Option<i64>,
    /// Workers that started the run and have not completed it yet.
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored run id, invoking `create` only if none is stored.
    ///
    /// Errors from `create` are returned unchanged and leave the file as it
    /// was.
    pub fn start_run<F, E>(&self, create: F) -> Result<i64, E>
    where
        F: FnOnce() -> Result<i64, E>,
        E: From<StateError>,
    {
        self.with_exclusive_lock(|file| {
            let mut state = read_state(file)?;

            let run_id = match state.run_id.filter(|_| state.count > 0) {
                Some(run_id) => {
                    state.count += 1;
                    debug!(run_id, count = state.count, "Joined existing run");
                    run_id
                }
                None => {
                    let run_id = create()?;
                    state = RunState {
                        run_id: Some(run_id),
                        count: 1,
                    };
                    info!(run_id, "Registered new run");
                    run_id
                }
            };

            write_state(file, &state)?;
            Ok(run_id)
        })
    }

    /// Releases one reference to the run.
    ///
    /// When the last reference goes away `complete` runs and the file is
    /// removed. Returns whether this call completed the run.
    pub fn complete_run<F, E>(&self, complete: F) -> Result<bool, E>
    where
        F: FnOnce() -> Result<(), E>,
        E: From<StateError>,
    {
        self.with_exclusive_lock(|file| {
            let mut state = read_state(file)?;

            if state.run_id.is_none() || state.count == 0 {
                // Nothing references this file any more; keeping it would let
                // the next session join a run nobody will complete.
                warn!(path = %self.path.display(), "No active run to complete");
                fs::remove_file(&self.path).map_err(StateError::from)?;
                return Ok(false);
            }

            state.count -= 1;
            if state.count > 0 {
                debug!(run_id = ?state.run_id, count = state.count, "Released run reference");
                write_state(file, &state)?;
                return Ok(false);
            }

            // The last reference is gone either way, so a failed completion
            // still removes the file before the error is returned.
            let completed = complete();
            fs::remove_file(&self.path).map_err(StateError::from)?;
            completed?;
            info!(run_id = ?state.run_id, "Run completed by last worker");
            Ok(true)
        })
    }

    /// Registers a run whose id is fixed by configuration.
    ///
    /// A stored run with a different id is left over from another session
    /// and is replaced.
    pub fn start_assigned_run(&self, run_id: i64) -> Result<i64, StateError> {
        self.with_exclusive_lock(|file| {
            let mut state = read_state(file)?;

            match state.run_id.filter(|_| state.count > 0) {
                Some(stored) if stored == run_id => state.count += 1,
                stored => {
                    if let Some(stored) = stored {
                        warn!(stored, run_id, "Replacing run state of a different run");
                    }
                    state = RunState {
                        run_id: Some(run_id),
                        count: 1,
                    };
                }
            }

            debug!(run_id, count = state.count, "Registered assigned run");
            write_state(file, &state)?;
            Ok(run_id)
        })
    }

    /// Drops one reference without completing the run.
    ///
    /// Used when a worker stops reporting into the run. The file is removed
    /// once no references remain.
    pub fn release_run(&self) -> Result<(), StateError> {
        self.with_exclusive_lock(|file| {
            let mut state = read_state(file)?;
            state.count = state.count.saturating_sub(1);

            if state.run_id.is_none() || state.count == 0 {
                info!(run_id = ?state.run_id, "Run abandoned by last worker");
                fs::remove_file(&self.path)?;
                return Ok(());
            }

            debug!(run_id = ?state.run_id, count = state.count, "Released run reference without completing");
            write_state(file, &state)
        })
    }

    /// Current state, or `None` when no run is being tracked.
    pub fn read(&self) -> Result<Option<RunState>, StateError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(parse_state(&content))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs `f` with the state file open and exclusively locked.
    ///
    /// A file that was unlinked by a completing worker while we waited for
    /// the lock is no longer the state file, so the open is retried until the
    /// locked inode is the one at `path`.
    #[cfg(unix)]
    fn with_exclusive_lock<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut File) -> Result<T, E>,
        E: From<StateError>,
    {
        use nix::fcntl::{Flock, FlockArg};
        use std::os::fd::AsFd;
        use std::os::unix::fs::MetadataExt;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StateError::from)?;
        }

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)
                .map_err(StateError::from)?;

            let flock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
                StateError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    format!("flock failed: {}", errno),
                ))
            })?;

            let borrowed_fd = flock.as_fd();
            let owned_fd = borrowed_fd.try_clone_to_owned().map_err(StateError::from)?;
            let mut file: File = owned_fd.into();

            let locked = file.metadata().map_err(StateError::from)?;
            match fs::metadata(&self.path) {
                Ok(current) if current.dev() == locked.dev() && current.ino() == locked.ino() => {}
                Ok(_) => {
                    debug!(path = %self.path.display(), "State file replaced while waiting, retrying");
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StateError::from(e).into()),
            }

            return f(&mut file);
        }
    }

    #[cfg(not(unix))]
    fn with_exclusive_lock<T, E, F>(&self, _f: F) -> Result<T, E>
    where
        F: FnOnce(&mut File) -> Result<T, E>,
        E: From<StateError>,
    {
        Err(StateError::UnsupportedPlatform.into())
    }
}

fn parse_state(content: &str) -> RunState {
    if content.trim().is_empty() {
        return RunState::default();
    }
    serde_json::from_str(content).unwrap_or_else(|e| {
        warn!("Run state file is unreadable, starting over: {}", e);
        RunState::default()
    })
}

fn read_state(file: &mut File) -> Result<RunState, StateError> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut content)?;
    Ok(parse_state(&content))
}

fn write_state(file: &mut File, state: &RunState) -> Result<(), StateError> {
    let json =
        serde_json::to_string_pretty(state).map_err(|e| StateError::Encode(e.to_string()))?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> RunStateStore {
        RunStateStore::new(temp.path().join("state").join("run.json"))
    }

    #[test]
    fn test_first_start_creates_run() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let run_id = store.start_run(|| Ok::<_, StateError>(17)).unwrap();

        assert_eq!(run_id, 17);
        assert_eq!(
            store.read().unwrap(),
            Some(RunState {
                run_id: Some(17),
                count: 1
            })
        );
    }

    #[test]
    fn test_second_start_reuses_run() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.start_run(|| Ok::<_, StateError>(5)).unwrap();

        let run_id = store
            .start_run(|| -> Result<i64, StateError> { panic!("must not create twice") })
            .unwrap();

        assert_eq!(run_id, 5);
        assert_eq!(store.read().unwrap().unwrap().count, 2);
    }

    #[test]
    fn test_create_error_leaves_no_run() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let result = store.start_run(|| {
            Err::<i64, _>(StateError::Encode("server down".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.read().unwrap(), Some(RunState::default()));
    }

    #[test]
    fn test_corrupt_file_is_reinitialized() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ definitely not json").unwrap();

        let run_id = store.start_run(|| Ok::<_, StateError>(9)).unwrap();

        assert_eq!(run_id, 9);
        assert_eq!(store.read().unwrap().unwrap().count, 1);
    }

    #[test]
    fn test_complete_runs_callback_on_last_reference() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.start_run(|| Ok::<_, StateError>(3)).unwrap();
        store.start_run(|| Ok::<_, StateError>(3)).unwrap();

        let calls = Cell::new(0);
        let complete = || {
            calls.set(calls.get() + 1);
            Ok::<_, StateError>(())
        };

        assert!(!store.complete_run(complete).unwrap());
        assert_eq!(calls.get(), 0);
        assert_eq!(store.read().unwrap().unwrap().count, 1);

        assert!(store.complete_run(complete).unwrap());
        assert_eq!(calls.get(), 1);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_complete_without_run_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let completed = store
            .complete_run(|| -> Result<(), StateError> { panic!("nothing to complete") })
            .unwrap();

        assert!(!completed);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_failed_completion_still_removes_file() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.start_run(|| Ok::<_, StateError>(4)).unwrap();

        let result = store.complete_run(|| Err(StateError::Encode("server down".to_string())));

        assert!(result.is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_release_keeps_other_references() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.start_run(|| Ok::<_, StateError>(8)).unwrap();
        store.start_run(|| Ok::<_, StateError>(8)).unwrap();

        store.release_run().unwrap();
        assert_eq!(
            store.read().unwrap(),
            Some(RunState {
                run_id: Some(8),
                count: 1
            })
        );

        store.release_run().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_assigned_run_replaces_stale_state() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.start_run(|| Ok::<_, StateError>(5)).unwrap();

        assert_eq!(store.start_assigned_run(12).unwrap(), 12);
        assert_eq!(
            store.read().unwrap(),
            Some(RunState {
                run_id: Some(12),
                count: 1
            })
        );

        assert_eq!(store.start_assigned_run(12).unwrap(), 12);
        assert_eq!(store.read().unwrap().unwrap().count, 2);
    }

    #[test]
    fn test_zero_count_run_is_not_joined() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"runId": 3, "count": 0}"#).unwrap();

        let run_id = store.start_run(|| Ok::<_, StateError>(10)).unwrap();
        assert_eq!(run_id, 10);
    }

    #[test]
    fn test_start_after_completion_creates_new_run() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.start_run(|| Ok::<_, StateError>(1)).unwrap();
        store.complete_run(|| Ok::<_, StateError>(())).unwrap();

        let run_id = store.start_run(|| Ok::<_, StateError>(2)).unwrap();
        assert_eq!(run_id, 2);
    }
}
