//! Task index: a fast directory of task summaries
//!
//! The index mirrors one compact entry per task record so that id lookups,
//! status filters and trigger candidates never require scanning the task
//! directory. It is authoritative for cheap "is this id live?" queries; the
//! task records remain authoritative for everything else.
//
// Task and index writes are not transactional, so a crash can leave an
// orphan record or a stale entry. Rebuilding from the task directory detects
// and repairs both: orphan records are indexed, entries for missing files
// are dropped.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::task::{PriorityLevel, Task, TaskStatus};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::store::StateStore;

/// Compact projection of a task, sufficient for lookup, ranking hints and
/// trigger candidate construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub project: String,
    pub tags: Vec<String>,
    pub level: PriorityLevel,
    pub last_active: DateTime<Utc>,
    /// Custom switch phrases, carried so trigger detection avoids record reads
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
}

impl IndexEntry {
    fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status(),
            project: task.context.project.clone(),
            tags: task.tags.iter().cloned().collect(),
            level: task.priority.level,
            last_active: task.timing.last_active,
            trigger_phrases: task.trigger_phrases.clone(),
        }
    }
}

/// The index file contents. A BTreeMap keeps the serialized form stable,
/// which makes diffs of the on-disk file readable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskIndex {
    #[serde(default)]
    pub entries: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    pub rebuilt_at: Option<DateTime<Utc>>,
}

impl TaskIndex {
    /// O(1) lookup by id.
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Cheap liveness check.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or refresh the entry for a task.
    pub fn upsert(&mut self, task: &Task) {
        self.entries
            .insert(task.id.clone(), IndexEntry::from_task(task));
    }

    /// Drop the entry for an id, if present.
    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        self.entries.remove(id)
    }

    /// Iterate entries whose status is not terminal.
    pub fn live_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values().filter(|e| !e.status.is_terminal())
    }

    /// Filtered iteration over all entries.
    #[allow(dead_code)]
    pub fn filtered<'a>(
        &'a self,
        status: Option<TaskStatus>,
        project: Option<&'a str>,
        level: Option<PriorityLevel>,
    ) -> impl Iterator<Item = &'a IndexEntry> {
        self.entries.values().filter(move |e| {
            status.is_none_or(|s| e.status == s)
                && project.is_none_or(|p| e.project == p)
                && level.is_none_or(|l| e.level == l)
        })
    }
}

/// Load the index, rebuilding it when it is stale or missing.
pub async fn load_or_rebuild(store: &StateStore) -> Result<TaskIndex> {
    if index_is_stale(store).await {
        rebuild(store).await
    } else {
        store.read_state(&store.index_path()).await
    }
}

/// Rebuild the index by scanning the task directory, repairing any drift
/// between records and entries, and persist the result.
pub async fn rebuild(store: &StateStore) -> Result<TaskIndex> {
    let previous: TaskIndex = store.read_state(&store.index_path()).await?;
    let mut index = TaskIndex {
        entries: BTreeMap::new(),
        rebuilt_at: Some(Utc::now()),
    };

    let tasks = store.load_all_tasks().await?;
    for task in &tasks {
        if !previous.contains(&task.id) {
            debug!(id = %task.id, "indexing orphan task record");
        }
        index.upsert(task);
    }

    let dropped: Vec<&String> = previous
        .entries
        .keys()
        .filter(|id| !index.contains(id))
        .collect();
    if !dropped.is_empty() {
        info!(count = dropped.len(), "dropped index entries for missing task records");
    }

    store.write_state(&store.index_path(), &index).await?;
    Ok(index)
}

/// The index is stale when any task record was written after the index file.
/// The comparison uses file mtimes only, so it stays cheap.
async fn index_is_stale(store: &StateStore) -> bool {
    let index_mtime = match tokio::fs::metadata(store.index_path()).await {
        Ok(meta) => match meta.modified() {
            Ok(t) => t,
            Err(_) => return true,
        },
        Err(_) => return true,
    };

    // Directory mtime moves on create and delete, which covers removals
    // that would otherwise leave no newer file behind.
    if let Ok(meta) = tokio::fs::metadata(store.tasks_dir()).await {
        if let Ok(dir_mtime) = meta.modified() {
            if dir_mtime > index_mtime {
                return true;
            }
        }
    }

    let mut entries = match tokio::fs::read_dir(store.tasks_dir()).await {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(meta) = entry.metadata().await {
            if let Ok(mtime) = meta.modified() {
                if mtime > index_mtime {
                    return true;
                }
            }
        }
    }
    false
}
