//! Task record data model
//!
//! This module defines the canonical in-memory representation of a task:
//! lifecycle status, priority inputs, timing counters, and accumulated
//! context. The record is a data object; scheduling and persistence live in
//! the binary crate. The only logic here enforces record-local invariants
//! (status transition validity, progress bounds) and derives cheap
//! projections such as the token estimate.

use crate::CtmError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Schema version written into every persisted record.
pub const SCHEMA_VERSION: u32 = 1;

/// Conservative token cost of a single character of context text.
///
/// Deliberately coarse (4 characters per token); swap this constant rather
/// than touching estimate call sites.
pub const TOKENS_PER_CHAR: f64 = 0.25;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
    Blocked,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status ends the task's life.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// The closed transition table. Anything not listed is rejected.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Active, Paused)
                | (Paused, Active)
                | (Active, Blocked)
                | (Blocked, Active)
                | (Active, Completed)
                | (Active, Cancelled)
                | (Paused, Completed)
                | (Paused, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Explicit priority level, used as the first tie-break between equal scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl PriorityLevel {
    /// Ordering rank, highest first.
    pub fn rank(self) -> u8 {
        match self {
            PriorityLevel::Critical => 0,
            PriorityLevel::High => 1,
            PriorityLevel::Normal => 2,
            PriorityLevel::Low => 3,
            PriorityLevel::Background => 4,
        }
    }

    /// Parse a level name from CLI input.
    pub fn parse(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "critical" => Ok(PriorityLevel::Critical),
            "high" => Ok(PriorityLevel::High),
            "normal" => Ok(PriorityLevel::Normal),
            "low" => Ok(PriorityLevel::Low),
            "background" => Ok(PriorityLevel::Background),
            other => Err(CtmError::Validation(format!(
                "unknown priority level '{}' (expected critical, high, normal, low or background)",
                other
            ))
            .into()),
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PriorityLevel::Critical => "critical",
            PriorityLevel::High => "high",
            PriorityLevel::Normal => "normal",
            PriorityLevel::Low => "low",
            PriorityLevel::Background => "background",
        };
        write!(f, "{}", name)
    }
}

/// A timestamped context note (decision or learning).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    pub text: String,
    pub at: DateTime<Utc>,
}

/// A recorded deviation from the planned approach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deviation {
    pub kind: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// Accumulated working context of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    /// Project path this task belongs to
    #[serde(default)]
    pub project: String,
    /// Files central to the task, in discovery order
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<ContextEntry>,
    #[serde(default)]
    pub learnings: Vec<ContextEntry>,
    #[serde(default)]
    pub deviations: Vec<Deviation>,
    /// Short prose describing where work currently stands
    #[serde(default)]
    pub current_step: String,
}

/// The most recent error observed while working the task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A lightweight checkpoint marker kept on the record itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMark {
    pub at: DateTime<Utc>,
    pub summary: String,
}

/// Mutable execution state of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskState {
    pub status: TaskStatus,
    /// Completion estimate in percent, clamped to [0, 100]
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub pending_actions: Vec<String>,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointMark>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            status: TaskStatus::Active,
            progress_percent: 0,
            pending_actions: Vec::new(),
            last_error: None,
            checkpoints: Vec::new(),
        }
    }
}

/// Priority inputs and the derived score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPriority {
    pub level: PriorityLevel,
    /// Deadline pressure in [0, 1]
    pub urgency: f64,
    /// Configured value in [0, 1]
    pub value: f64,
    /// Freshness in [0, 1]
    pub novelty: f64,
    /// Explicit user signal in [-1, 1]
    pub user_signal: f64,
    /// Last computed composite score in [0, 1]
    #[serde(default)]
    pub computed_score: f64,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self {
            level: PriorityLevel::Normal,
            urgency: 0.5,
            value: 0.5,
            novelty: 1.0,
            user_signal: 0.0,
            computed_score: 0.0,
        }
    }
}

/// Timing counters for scheduling and session accounting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTiming {
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Set while this task is the active one; cleared on switch-away
    #[serde(default)]
    pub active_since: Option<DateTime<Utc>>,
    /// Seconds this task has been the active one, across all sessions
    #[serde(default)]
    pub total_active_seconds: u64,
    /// Number of sessions that touched this task
    #[serde(default)]
    pub session_count: u32,
    #[serde(default)]
    pub estimated_remaining_minutes: Option<u64>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Artifacts produced while working the task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskOutputs {
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One span of work on a task within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSpan {
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project: String,
}

/// The canonical task record.
///
/// Records reference each other by id only (blockers, parent, children);
/// traversal always goes through the store, so there is no shared object
/// graph to keep consistent in memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Opaque 8-character id
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Declared prerequisites (informational)
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Tasks that must complete before this one may run
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub context: TaskContext,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub priority: TaskPriority,
    pub timing: TaskTiming,
    /// Custom phrases that suggest switching to this task
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default)]
    pub outputs: TaskOutputs,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub sessions: Vec<SessionSpan>,
    /// Record schema generation; readers refuse to mutate newer schemas
    #[serde(default = "schema_version_default")]
    pub schema_version: u32,
    /// Optimistic concurrency counter; absent in legacy records
    #[serde(default)]
    pub version: u64,
    /// Wall-clock stamp of the last persisted write
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn schema_version_default() -> u32 {
    SCHEMA_VERSION
}

impl Task {
    /// Create a fresh active task with default priority inputs.
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            goal: String::new(),
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
            blocked_by: Vec::new(),
            tags: BTreeSet::new(),
            context: TaskContext::default(),
            state: TaskState::default(),
            priority: TaskPriority::default(),
            timing: TaskTiming {
                created_at: now,
                last_active: now,
                active_since: None,
                total_active_seconds: 0,
                session_count: 0,
                estimated_remaining_minutes: None,
                deadline: None,
            },
            trigger_phrases: Vec::new(),
            outputs: TaskOutputs::default(),
            parent: None,
            children: Vec::new(),
            sessions: Vec::new(),
            schema_version: SCHEMA_VERSION,
            version: 0,
            updated_at: now,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> TaskStatus {
        self.state.status
    }

    /// Whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.state.status.is_terminal()
    }

    /// Apply a status transition, enforcing the transition table.
    pub fn transition(&mut self, to: TaskStatus) -> crate::Result<()> {
        let from = self.state.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(CtmError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        self.state.status = to;
        Ok(())
    }

    /// Set progress, clamping to [0, 100].
    pub fn set_progress(&mut self, percent: u8) {
        self.state.progress_percent = percent.min(100);
    }

    /// Append a decision note.
    pub fn record_decision(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.context.decisions.push(ContextEntry {
            text: text.into(),
            at: now,
        });
    }

    /// Append a learning note.
    pub fn record_learning(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.context.learnings.push(ContextEntry {
            text: text.into(),
            at: now,
        });
    }

    /// Append a deviation record.
    pub fn record_deviation(
        &mut self,
        kind: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.context.deviations.push(Deviation {
            kind: kind.into(),
            description: description.into(),
            at: now,
        });
    }

    /// Register a key file, keeping the list free of duplicates.
    pub fn record_key_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.context.key_files.contains(&path) {
            self.context.key_files.push(path);
        }
    }

    /// Record the most recent error.
    pub fn record_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.state.last_error = Some(LastError {
            message: message.into(),
            at: now,
        });
    }

    /// Whether an unresolved error was recorded within the last 24 hours.
    pub fn has_recent_error(&self, now: DateTime<Utc>) -> bool {
        self.state
            .last_error
            .as_ref()
            .map(|e| now.signed_duration_since(e.at) <= Duration::hours(24))
            .unwrap_or(false)
    }

    /// Conservative token estimate for holding this task hot.
    ///
    /// Sums the lengths of the title, goal, the trailing `tail` decisions and
    /// learnings, the current step, and the pending actions. Never reads file
    /// contents from disk.
    pub fn token_estimate(&self, tail: usize) -> u32 {
        let mut chars = self.title.len() + self.goal.len() + self.context.current_step.len();
        chars += self
            .context
            .decisions
            .iter()
            .rev()
            .take(tail)
            .map(|d| d.text.len())
            .sum::<usize>();
        chars += self
            .context
            .learnings
            .iter()
            .rev()
            .take(tail)
            .map(|l| l.text.len())
            .sum::<usize>();
        chars += self
            .state
            .pending_actions
            .iter()
            .map(|a| a.len())
            .sum::<usize>();
        (chars as f64 * TOKENS_PER_CHAR).ceil() as u32
    }
}
