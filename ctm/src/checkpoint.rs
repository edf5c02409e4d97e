//! Checkpoints, resumption snapshots and hook idempotency leases
//!
//! Checkpoints are small durable captures of a task's state taken at
//! well-defined moments; snapshots are richer standalone documents meant to
//! resume work across process lifetimes. Both live under the engine root.
//! Leases guard the event-driven trigger points so that duplicate hook
//! firings within the TTL are no-ops.

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as B64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use shared::task::{ContextEntry, LastError, Task, TaskStatus, TOKENS_PER_CHAR};
use shared::utils::{calculate_string_checksum, truncate_string};
use std::io::Write as _;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::store::StateStore;

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Manual,
    PreCompact,
    SessionEnd,
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CheckpointKind::Manual => "manual",
            CheckpointKind::PreCompact => "pre_compact",
            CheckpointKind::SessionEnd => "session_end",
        };
        write!(f, "{}", name)
    }
}

/// A durable checkpoint record. Context is not re-copied; the task record
/// already holds it. Counts let a reader judge drift at a glance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub task_id: String,
    pub at: DateTime<Utc>,
    pub kind: CheckpointKind,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub current_step: String,
    pub decision_count: usize,
    pub learning_count: usize,
    pub file_count: usize,
}

/// A standalone document sufficient to resume a task's work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub task_id: String,
    pub at: DateTime<Utc>,
    pub title: String,
    pub goal: String,
    pub project: String,
    pub current_step: String,
    pub progress_percent: u8,
    /// Trailing decisions, oldest first
    pub decisions: Vec<ContextEntry>,
    /// Trailing learnings, oldest first
    pub learnings: Vec<ContextEntry>,
    pub key_files: Vec<String>,
    pub pending_actions: Vec<String>,
    pub blocked_by: Vec<String>,
    pub last_error: Option<LastError>,
}

/// One line of a task's compressed context archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveEntry {
    pub at: DateTime<Utc>,
    /// gzip of the trimmed entries as JSON, base64 encoded
    pub encoded: String,
}

/// Manager over checkpoint, snapshot and lease files.
pub struct CheckpointManager {
    store: StateStore,
    /// Checkpoints retained per task
    keep: usize,
    /// Trailing context entries included in snapshots
    tail: usize,
}

impl CheckpointManager {
    pub fn new(store: StateStore, keep: usize, tail: usize) -> Self {
        Self { store, keep, tail }
    }

    /// Write a checkpoint for the task and stamp the record with a
    /// checkpoint mark. Older checkpoints beyond the retention limit are
    /// pruned.
    pub async fn checkpoint_task(
        &self,
        task: &Task,
        kind: CheckpointKind,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let checkpoint = Checkpoint {
            task_id: task.id.clone(),
            at: now,
            kind,
            status: task.status(),
            progress_percent: task.state.progress_percent,
            current_step: task.context.current_step.clone(),
            decision_count: task.context.decisions.len(),
            learning_count: task.context.learnings.len(),
            file_count: task.context.key_files.len(),
        };
        let path = self
            .store
            .checkpoints_dir()
            .join(format!("{}-{}.json", task.id, now.timestamp()));
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        self.store.write_atomic(&path, &bytes).await?;
        info!(id = %task.id, kind = %kind, path = %path.display(), "checkpoint written");

        let summary = if task.context.current_step.is_empty() {
            kind.to_string()
        } else {
            format!("{}: {}", kind, truncate_string(&task.context.current_step, 80))
        };
        if let Err(e) = self
            .store
            .update_task(&task.id, move |t| {
                t.state.checkpoints.push(shared::task::CheckpointMark {
                    at: now,
                    summary: summary.clone(),
                });
                Ok(())
            })
            .await
        {
            warn!(id = %task.id, error = %e, "failed to stamp checkpoint mark on record");
        }

        if let Err(e) = self.prune_checkpoints(&task.id).await {
            warn!(id = %task.id, error = %e, "checkpoint pruning failed");
        }
        Ok(path)
    }

    /// Write the latest resumption snapshot for a task, replacing any
    /// previous one.
    pub async fn snapshot_task(&self, task: &Task, now: DateTime<Utc>) -> Result<PathBuf> {
        let tail_of = |entries: &[ContextEntry]| -> Vec<ContextEntry> {
            let skip = entries.len().saturating_sub(self.tail);
            entries[skip..].to_vec()
        };
        let snapshot = Snapshot {
            task_id: task.id.clone(),
            at: now,
            title: task.title.clone(),
            goal: task.goal.clone(),
            project: task.context.project.clone(),
            current_step: task.context.current_step.clone(),
            progress_percent: task.state.progress_percent,
            decisions: tail_of(&task.context.decisions),
            learnings: tail_of(&task.context.learnings),
            key_files: task.context.key_files.clone(),
            pending_actions: task.state.pending_actions.clone(),
            blocked_by: task.blocked_by.clone(),
            last_error: task.state.last_error.clone(),
        };
        let path = self
            .store
            .snapshots_dir()
            .join(format!("{}.json", task.id));
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        self.store.write_atomic(&path, &bytes).await?;
        debug!(id = %task.id, "snapshot written");
        Ok(path)
    }

    /// Read the latest snapshot for a task, if one exists.
    #[allow(dead_code)]
    pub async fn read_snapshot(&self, task_id: &str) -> Result<Option<Snapshot>> {
        let path = self
            .store
            .snapshots_dir()
            .join(format!("{}.json", task_id));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Compress a task's context when its full estimate exceeds the
    /// threshold: decisions and learnings are trimmed to the trailing
    /// `keep_tail` entries, key files are de-duplicated, and the trimmed
    /// entries are archived gzip-compressed next to the snapshot.
    ///
    /// Returns whether compression ran.
    pub async fn compress_context_if_needed(
        &self,
        task_id: &str,
        threshold_tokens: u32,
        keep_tail: usize,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut trimmed: Option<(Vec<ContextEntry>, Vec<ContextEntry>)> = None;
        self.store
            .update_task(task_id, |task| {
                if full_context_tokens(task) <= threshold_tokens {
                    return Ok(());
                }
                let cut_d = task.context.decisions.len().saturating_sub(keep_tail);
                let cut_l = task.context.learnings.len().saturating_sub(keep_tail);
                if cut_d == 0 && cut_l == 0 {
                    return Ok(());
                }
                let old_decisions: Vec<ContextEntry> =
                    task.context.decisions.drain(..cut_d).collect();
                let old_learnings: Vec<ContextEntry> =
                    task.context.learnings.drain(..cut_l).collect();

                let mut seen = std::collections::HashSet::new();
                task.context
                    .key_files
                    .retain(|f| seen.insert(f.clone()));

                task.record_deviation(
                    "context_compressed",
                    format!(
                        "archived {} decisions and {} learnings",
                        old_decisions.len(),
                        old_learnings.len()
                    ),
                    now,
                );
                trimmed = Some((old_decisions, old_learnings));
                Ok(())
            })
            .await?;

        let Some((decisions, learnings)) = trimmed else {
            return Ok(false);
        };
        self.archive_entries(task_id, &decisions, &learnings, now)
            .await?;
        info!(
            id = task_id,
            decisions = decisions.len(),
            learnings = learnings.len(),
            "context compressed"
        );
        Ok(true)
    }

    async fn archive_entries(
        &self,
        task_id: &str,
        decisions: &[ContextEntry],
        learnings: &[ContextEntry],
        now: DateTime<Utc>,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct ArchivePayload<'a> {
            decisions: &'a [ContextEntry],
            learnings: &'a [ContextEntry],
        }
        let json = serde_json::to_vec(&ArchivePayload {
            decisions,
            learnings,
        })?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;
        let entry = ArchiveEntry {
            at: now,
            encoded: B64_STANDARD.encode(compressed),
        };

        let path = self
            .store
            .snapshots_dir()
            .join(format!("{}.archive.jsonl", task_id));
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete checkpoints beyond the retention limit, oldest first.
    async fn prune_checkpoints(&self, task_id: &str) -> Result<()> {
        let dir = self.store.checkpoints_dir();
        let prefix = format!("{}-", task_id);
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                paths.push(entry.path());
            }
        }
        if paths.len() <= self.keep {
            return Ok(());
        }
        // Timestamps in the file names sort lexicographically within a task
        paths.sort();
        let excess = paths.len() - self.keep;
        for path in paths.into_iter().take(excess) {
            debug!(path = %path.display(), "pruning old checkpoint");
            let _ = tokio::fs::remove_file(&path).await;
        }
        Ok(())
    }

    /// Try to take the lease for a trigger point scoped to a working
    /// directory. Returns false when a fresh lease exists, in which case the
    /// caller must skip its work.
    pub async fn acquire_lease(
        &self,
        hook_name: &str,
        scope: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let scope_checksum = calculate_string_checksum(scope);
        let path = self
            .store
            .leases_dir()
            .join(format!("{}-{}.lease", hook_name, &scope_checksum[..12]));

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if let Ok(mtime) = meta.modified() {
                let age = std::time::SystemTime::now()
                    .duration_since(mtime)
                    .unwrap_or_default();
                if age.as_secs() < ttl_seconds {
                    debug!(hook = hook_name, age_secs = age.as_secs(), "lease fresh, skipping");
                    return Ok(false);
                }
            }
        }

        self.store
            .write_atomic(&path, now.to_rfc3339().as_bytes())
            .await?;
        Ok(true)
    }
}

/// Token estimate over the full context lists, not just the trailing window.
fn full_context_tokens(task: &Task) -> u32 {
    let mut chars = task.title.len() + task.goal.len() + task.context.current_step.len();
    chars += task
        .context
        .decisions
        .iter()
        .map(|d| d.text.len())
        .sum::<usize>();
    chars += task
        .context
        .learnings
        .iter()
        .map(|l| l.text.len())
        .sum::<usize>();
    chars += task
        .state
        .pending_actions
        .iter()
        .map(|a| a.len())
        .sum::<usize>();
    (chars as f64 * TOKENS_PER_CHAR).ceil() as u32
}
