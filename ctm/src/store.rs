//! Durable state store for the task management engine
//!
//! All persistent structures live under a single root directory: one JSON
//! file per task record plus single files for the index, the scheduler state
//! and the working memory state. The store is the only component that
//! touches the on-disk form; everything else borrows records for the
//! duration of an operation and hands them back through this module.
//
// Multiple short-lived processes (CLI invocations, lifecycle hooks) may
// operate on the same root concurrently. Correctness rests on two pieces:
// every write goes through temp-file + fsync + rename, so readers always see
// a complete file, and every task record carries a version counter checked
// at write time, so conflicting writers are detected and retried.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::task::{Task, TaskStatus, SCHEMA_VERSION};
use shared::utils::calculate_backoff_ms;
use shared::CtmError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// File and directory names under the engine root.
const TASKS_DIR: &str = "tasks";
const CHECKPOINTS_DIR: &str = "checkpoints";
const SNAPSHOTS_DIR: &str = "snapshots";
const CONSOLIDATED_DIR: &str = "consolidated";
const LEASES_DIR: &str = "leases";
const LOGS_DIR: &str = "logs/hooks";
const INDEX_FILE: &str = "index.json";
const SCHEDULER_FILE: &str = "scheduler.json";
const WORKING_MEMORY_FILE: &str = "working_memory.json";

/// Distinguishes temp files written by concurrent processes sharing a pid
/// namespace; bumped per write within this process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filter for [`StateStore::list_task_ids`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub project: Option<String>,
    pub tag: Option<String>,
    /// Only tasks whose last_active is within this many seconds of now
    pub active_within_seconds: Option<i64>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status() != status {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if &task.context.project != project {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !task.tags.contains(tag) {
                return false;
            }
        }
        if let Some(window) = self.active_within_seconds {
            let age = Utc::now().signed_duration_since(task.timing.last_active);
            if age > Duration::seconds(window) {
                return false;
            }
        }
        true
    }
}

/// Handle to the on-disk state under one engine root.
///
/// Cheap to clone; holds no open file handles between operations.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
    retry_limit: u32,
    retry_base_ms: u64,
}

impl StateStore {
    /// Create a store handle for the given root. Does not touch the disk;
    /// call [`StateStore::init_layout`] to create the directory tree.
    pub fn new(root: impl Into<PathBuf>, retry_limit: u32, retry_base_ms: u64) -> Self {
        Self {
            root: root.into(),
            retry_limit,
            retry_base_ms,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn consolidated_dir(&self) -> PathBuf {
        self.root.join(CONSOLIDATED_DIR)
    }

    pub fn leases_dir(&self) -> PathBuf {
        self.root.join(LEASES_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn scheduler_path(&self) -> PathBuf {
        self.root.join(SCHEDULER_FILE)
    }

    pub fn working_memory_path(&self) -> PathBuf {
        self.root.join(WORKING_MEMORY_FILE)
    }

    fn task_path(&self, id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", id))
    }

    /// Create the directory layout if absent. Idempotent.
    pub async fn init_layout(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.tasks_dir(),
            self.checkpoints_dir(),
            self.snapshots_dir(),
            self.consolidated_dir(),
            self.leases_dir(),
            self.logs_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| storage_err(&dir, "create directory", e))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Atomic file primitives
    // ------------------------------------------------------------------

    /// Write full file contents atomically: temp file in the same directory,
    /// fsync, rename over the target. Readers never observe a partial file.
    pub async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CtmError::Storage(format!("invalid path: {}", path.display())))?;
        let tmp_name = format!(
            ".{}.{}-{}.tmp",
            file_name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let tmp_path = path.with_file_name(tmp_name);

        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            use tokio::io::AsyncWriteExt;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(e) = write_result {
            // Best effort removal of the orphaned temp file
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(storage_err(path, "write", e));
        }
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).with_context(|| {
                    format!("failed to parse state file {}", path.display())
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(path, "read", e)),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic(path, &bytes).await
    }

    // ------------------------------------------------------------------
    // Task records
    // ------------------------------------------------------------------

    /// Fetch a task record by id.
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        let path = self.task_path(id);
        self.read_json::<Task>(&path)
            .await?
            .ok_or_else(|| CtmError::NotFound(id.to_string()).into())
    }

    /// Whether a record file exists for the id. Cheaper than a full read.
    pub async fn task_exists(&self, id: &str) -> bool {
        tokio::fs::try_exists(self.task_path(id)).await.unwrap_or(false)
    }

    /// Atomic replace of a task record.
    ///
    /// The caller's record carries the version it was read at. If the stored
    /// record has moved on since, the write fails with
    /// [`CtmError::ConcurrentModification`] and nothing is written. On
    /// success the caller's record is reissued with the incremented version.
    pub async fn put_task(&self, task: &mut Task) -> Result<()> {
        let path = self.task_path(&task.id);
        if let Some(stored) = self.read_json::<Task>(&path).await? {
            if stored.schema_version > SCHEMA_VERSION {
                return Err(CtmError::SchemaMismatch {
                    id: task.id.clone(),
                    found: stored.schema_version,
                    supported: SCHEMA_VERSION,
                }
                .into());
            }
            if stored.version != task.version {
                return Err(CtmError::ConcurrentModification {
                    id: task.id.clone(),
                    expected: task.version,
                    found: stored.version,
                }
                .into());
            }
        }
        task.version += 1;
        task.schema_version = SCHEMA_VERSION;
        task.updated_at = Utc::now();
        if let Err(e) = self.write_json(&path, task).await {
            // Roll the in-memory version back so a retry re-reads cleanly
            task.version -= 1;
            return Err(e);
        }
        debug!(id = %task.id, version = task.version, "persisted task record");
        Ok(())
    }

    /// Optimistic read-modify-write loop.
    ///
    /// Reads the record, applies `apply`, and attempts the versioned write.
    /// On a conflicting write the loop backs off linearly and retries up to
    /// the configured limit, then surfaces [`CtmError::ConflictAbandoned`].
    /// Every successful mutation refreshes `last_active`.
    pub async fn update_task<F>(&self, id: &str, mut apply: F) -> Result<Task>
    where
        F: FnMut(&mut Task) -> Result<()>,
    {
        let limit = self.retry_limit.max(1);
        for attempt in 1..=limit {
            let mut task = self.get_task(id).await?;
            if task.schema_version > SCHEMA_VERSION {
                return Err(CtmError::SchemaMismatch {
                    id: id.to_string(),
                    found: task.schema_version,
                    supported: SCHEMA_VERSION,
                }
                .into());
            }
            apply(&mut task)?;
            task.timing.last_active = Utc::now();
            match self.put_task(&mut task).await {
                Ok(()) => return Ok(task),
                Err(e) => match e.downcast_ref::<CtmError>() {
                    Some(CtmError::ConcurrentModification { .. }) if attempt < limit => {
                        let delay = calculate_backoff_ms(attempt, self.retry_base_ms);
                        debug!(id, attempt, delay_ms = delay, "write conflict, retrying");
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    }
                    Some(CtmError::ConcurrentModification { .. }) => {
                        warn!(id, attempts = limit, "abandoning conflicted update");
                        return Err(CtmError::ConflictAbandoned {
                            id: id.to_string(),
                            attempts: limit,
                        }
                        .into());
                    }
                    _ => return Err(e),
                },
            }
        }
        unreachable!("retry loop returns on every path")
    }

    /// List ids of records matching the filter. Scans the task directory;
    /// use the index for cheap existence and status lookups.
    pub async fn list_task_ids(&self, filter: &TaskFilter) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for task in self.load_all_tasks().await? {
            if filter.matches(&task) {
                ids.push(task.id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load every readable task record. Unparseable files are logged and
    /// skipped so one corrupt record cannot take the engine down.
    pub async fn load_all_tasks(&self) -> Result<Vec<Task>> {
        let dir = self.tasks_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&dir, "scan", e)),
        };
        let mut tasks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err(&dir, "scan", e))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") || name.starts_with('.') {
                continue;
            }
            match self.read_json::<Task>(&path).await {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable task record"),
            }
        }
        Ok(tasks)
    }

    /// Remove a task record file. Used by cancellations that discard state;
    /// completed tasks are normally retained for archival.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let path = self.task_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CtmError::NotFound(id.to_string()).into())
            }
            Err(e) => Err(storage_err(&path, "delete", e)),
        }
    }

    /// Check whether adding `new_blockers` to `task_id` would close a cycle
    /// in the blocker relation. Traversal goes through stored records only.
    pub async fn would_create_blocker_cycle(
        &self,
        task_id: &str,
        new_blockers: &[String],
    ) -> Result<bool> {
        let mut stack: Vec<String> = new_blockers.to_vec();
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if current == task_id {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            // A blocker that does not exist cannot extend the chain
            match self.get_task(&current).await {
                Ok(task) => stack.extend(task.blocked_by.iter().cloned()),
                Err(e) => match e.downcast_ref::<CtmError>() {
                    Some(CtmError::NotFound(_)) => {}
                    _ => return Err(e),
                },
            }
        }
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Singleton state files
    // ------------------------------------------------------------------

    /// Read a singleton state file, falling back to its default form when the
    /// file does not exist yet.
    pub async fn read_state<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        Ok(self.read_json(path).await?.unwrap_or_default())
    }

    /// Write a singleton state file with the atomic rename discipline.
    pub async fn write_state<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.write_json(path, value).await
    }
}

fn storage_err(path: &Path, action: &str, e: std::io::Error) -> anyhow::Error {
    CtmError::Storage(format!("failed to {} {}: {}", action, path.display(), e)).into()
}
