//! Priority scheduling and session accounting
//!
//! The scheduler owns the ranked queue of runnable tasks, the pointer to the
//! currently active task, and the per-session counters. Scores are a
//! deterministic function of a task's priority inputs and the wall clock;
//! rebuilding the queue recomputes every score and applies blocker
//! propagation in both directions.
//
// The scheduler state is a single JSON file under the engine root, written
// with the same rename discipline as everything else. Instances are
// short-lived: load, operate, persist.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::config::PriorityWeights;
use shared::task::{PriorityLevel, SessionSpan, Task, TaskStatus};
use shared::CtmError;
use tracing::{debug, info, warn};

use crate::store::{StateStore, TaskFilter};

/// One ranked queue position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub task_id: String,
    pub score: f64,
}

/// Counters for the current session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub switches: u32,
    #[serde(default)]
    pub checkpoints: u32,
}

/// Persisted scheduler state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerState {
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    #[serde(default)]
    pub session: SessionInfo,
    #[serde(default)]
    pub last_rebuild_at: Option<DateTime<Utc>>,
}

/// Summary returned by [`Scheduler::end_session`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionStats {
    pub duration_seconds: i64,
    pub switches: u32,
    pub checkpoints: u32,
    pub tasks_touched: usize,
}

/// The queue engine over the persisted state.
pub struct Scheduler {
    store: StateStore,
    weights: PriorityWeights,
    pub state: SchedulerState,
}

impl Scheduler {
    /// Load scheduler state from the store.
    pub async fn load(store: StateStore, weights: PriorityWeights) -> Result<Self> {
        let state = store.read_state(&store.scheduler_path()).await?;
        Ok(Self {
            store,
            weights,
            state,
        })
    }

    /// Persist the current state.
    pub async fn persist(&self) -> Result<()> {
        self.store
            .write_state(&self.store.scheduler_path(), &self.state)
            .await
    }

    /// Record the start of a session, resetting the per-session counters.
    pub fn start_session(&mut self, project: impl Into<String>, now: DateTime<Utc>) {
        self.state.session = SessionInfo {
            start: Some(now),
            project: project.into(),
            switches: 0,
            checkpoints: 0,
        };
        info!(project = %self.state.session.project, "session started");
    }

    /// Finalize the session: settle the active task's time accounting and
    /// return the session counters.
    pub async fn end_session(
        &mut self,
        now: DateTime<Utc>,
        window_seconds: i64,
    ) -> Result<SessionStats> {
        if let Some(current) = self.state.current_task_id.clone() {
            if let Err(e) = self.settle_active_seconds(&current, now).await {
                warn!(id = %current, error = %e, "failed to settle active task accounting");
            }
        }

        let touched = self
            .store
            .list_task_ids(&TaskFilter {
                active_within_seconds: Some(window_seconds),
                ..TaskFilter::default()
            })
            .await
            .unwrap_or_default();

        let duration_seconds = self
            .state
            .session
            .start
            .map(|s| now.signed_duration_since(s).num_seconds().max(0))
            .unwrap_or(0);

        let stats = SessionStats {
            duration_seconds,
            switches: self.state.session.switches,
            checkpoints: self.state.session.checkpoints,
            tasks_touched: touched.len(),
        };
        self.state.session.start = None;
        info!(
            duration_seconds = stats.duration_seconds,
            switches = stats.switches,
            checkpoints = stats.checkpoints,
            tasks_touched = stats.tasks_touched,
            "session ended"
        );
        Ok(stats)
    }

    /// Bump the durable per-session checkpoint counter.
    pub fn note_checkpoint(&mut self) {
        self.state.session.checkpoints += 1;
    }

    /// The currently active task id, if any.
    pub fn get_active(&self) -> Option<&str> {
        self.state.current_task_id.as_deref()
    }

    /// The ranked queue, best first.
    pub fn get_queue(&self, limit: Option<usize>) -> &[QueueEntry] {
        let len = limit
            .unwrap_or(self.state.queue.len())
            .min(self.state.queue.len());
        &self.state.queue[..len]
    }

    /// Recompute scores for all runnable tasks and rebuild the queue.
    ///
    /// Blocker propagation runs first: active tasks with incomplete blockers
    /// are transitioned to blocked, and blocked tasks whose blockers have all
    /// completed return to active. Blocked and terminal tasks never enter
    /// the queue.
    pub async fn rebuild_queue(&mut self, now: DateTime<Utc>) -> Result<()> {
        let tasks = self.store.load_all_tasks().await?;
        let status_of: std::collections::HashMap<String, TaskStatus> =
            tasks.iter().map(|t| (t.id.clone(), t.status())).collect();

        let mut ranked: Vec<RankedTask> = Vec::new();
        for task in &tasks {
            if task.is_terminal() {
                continue;
            }

            let blocked = task.blocked_by.iter().any(|b| match status_of.get(b) {
                Some(status) => *status != TaskStatus::Completed,
                None => {
                    // A vanished blocker cannot be waited on
                    warn!(id = %task.id, blocker = %b, "blocker record missing, ignoring");
                    false
                }
            });

            let status = match (task.status(), blocked) {
                (TaskStatus::Active, true) => {
                    self.transition_status(&task.id, TaskStatus::Blocked).await;
                    TaskStatus::Blocked
                }
                (TaskStatus::Blocked, false) => {
                    self.transition_status(&task.id, TaskStatus::Active).await;
                    TaskStatus::Active
                }
                (status, _) => status,
            };

            // Paused tasks keep their status but an incomplete blocker still
            // keeps them out of the queue
            if status == TaskStatus::Blocked || blocked {
                continue;
            }

            ranked.push(RankedTask {
                task_id: task.id.clone(),
                score: calculate_priority(task, now, &self.weights),
                level: task.priority.level,
                deadline: task.timing.deadline,
                created_at: task.timing.created_at,
            });
        }

        ranked.sort_by(compare_ranked);
        self.state.queue = ranked
            .into_iter()
            .map(|r| QueueEntry {
                task_id: r.task_id,
                score: r.score,
            })
            .collect();
        self.state.last_rebuild_at = Some(now);

        // The active pointer must keep referencing a runnable task
        if let Some(current) = self.state.current_task_id.clone() {
            let live = matches!(
                status_of.get(current.as_str()),
                Some(TaskStatus::Active) | Some(TaskStatus::Paused)
            ) && self.state.queue.iter().any(|e| e.task_id == current);
            if !live {
                debug!(id = %current, "clearing active pointer to non-runnable task");
                self.state.current_task_id = None;
            }
        }

        debug!(queue_len = self.state.queue.len(), "queue rebuilt");
        Ok(())
    }

    /// Make the given task the active one.
    ///
    /// Settles the previously active task's time accounting, opens a session
    /// span on the target, and bumps the switch counter. Switching to the
    /// already-active task is a no-op.
    pub async fn switch_to(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        if self.state.current_task_id.as_deref() == Some(id) {
            return Ok(());
        }

        let target = self.store.get_task(id).await?;
        match target.status() {
            TaskStatus::Active | TaskStatus::Paused => {}
            status => {
                return Err(CtmError::Validation(format!(
                    "cannot switch to task {} while it is {}",
                    id, status
                ))
                .into());
            }
        }

        if let Some(prev) = self.state.current_task_id.clone() {
            if let Err(e) = self.settle_active_seconds(&prev, now).await {
                warn!(id = %prev, error = %e, "failed to settle previous task accounting");
            }
        }

        let project = self.state.session.project.clone();
        let weights = self.weights;
        let updated = self
            .store
            .update_task(id, move |task| {
                if task.status() == TaskStatus::Paused {
                    task.transition(TaskStatus::Active)?;
                }
                task.timing.active_since = Some(now);
                task.timing.session_count += 1;
                task.sessions.push(SessionSpan {
                    start: now,
                    end: None,
                    project: project.clone(),
                });
                task.priority.computed_score = calculate_priority(task, now, &weights);
                Ok(())
            })
            .await?;
        let score = updated.priority.computed_score;

        self.state.current_task_id = Some(id.to_string());
        self.state.session.switches += 1;
        info!(id, score, switches = self.state.session.switches, "switched active task");
        Ok(())
    }

    /// Deterministic priority score for a task at the given instant.
    #[allow(dead_code)]
    pub fn calculate_priority(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        calculate_priority(task, now, &self.weights)
    }

    /// Accumulate active seconds on a task and close its open session span.
    async fn settle_active_seconds(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.store
            .update_task(id, |task| {
                if let Some(since) = task.timing.active_since.take() {
                    let delta = now.signed_duration_since(since).num_seconds().max(0) as u64;
                    task.timing.total_active_seconds += delta;
                }
                if let Some(span) = task.sessions.last_mut() {
                    if span.end.is_none() {
                        span.end = Some(now);
                    }
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Best-effort status transition used by blocker propagation. Failures
    /// are logged; the rebuild continues with the remaining tasks.
    async fn transition_status(&self, id: &str, to: TaskStatus) {
        let result = self
            .store
            .update_task(id, move |task| task.transition(to))
            .await;
        match result {
            Ok(_) => debug!(id, status = %to, "blocker propagation applied"),
            Err(e) => warn!(id, status = %to, error = %e, "blocker propagation failed"),
        }
    }
}

struct RankedTask {
    task_id: String,
    score: f64,
    level: PriorityLevel,
    deadline: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Ordering for the queue: score descending, then explicit level, then the
/// earlier deadline (tasks with deadlines ahead of those without), then the
/// earlier creation time, then id for stability.
fn compare_ranked(a: &RankedTask, b: &RankedTask) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    if (a.score - b.score).abs() > 1e-9 {
        return b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal);
    }
    let by_level = a.level.rank().cmp(&b.level.rank());
    if by_level != Ordering::Equal {
        return by_level;
    }
    let by_deadline = match (a.deadline, b.deadline) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    if by_deadline != Ordering::Equal {
        return by_deadline;
    }
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.task_id.cmp(&b.task_id))
}

/// Deadline-proximity factor in [0, 1].
pub(crate) fn urgency_factor(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(deadline) = deadline else {
        return 0.5;
    };
    let seconds = deadline.signed_duration_since(now).num_seconds();
    if seconds <= 0 {
        return 1.0;
    }
    let days = seconds as f64 / 86_400.0;
    if days <= 3.0 {
        0.9
    } else if days <= 7.0 {
        0.7
    } else {
        0.5 * (14.0 / days).min(1.0)
    }
}

/// Exponential decay of time since last activity, 24-hour half-life.
pub(crate) fn recency_factor(last_active: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = now.signed_duration_since(last_active).num_seconds().max(0) as f64 / 3_600.0;
    (-(hours / 24.0)).exp2()
}

/// Exponential decay of task age, 7-day half-life.
pub(crate) fn novelty_factor(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = now.signed_duration_since(created_at).num_seconds().max(0) as f64 / 86_400.0;
    (-(days / 7.0)).exp2()
}

/// Composite priority score in [0, 1]. Pure in the task fields and `now`.
pub fn calculate_priority(task: &Task, now: DateTime<Utc>, weights: &PriorityWeights) -> f64 {
    let urgency = urgency_factor(task.timing.deadline, now);
    let recency = recency_factor(task.timing.last_active, now);
    let value = task.priority.value.clamp(0.0, 1.0);
    let novelty = novelty_factor(task.timing.created_at, now);
    let signal = ((task.priority.user_signal + 1.0) / 2.0).clamp(0.0, 1.0);
    let error_boost = if task.has_recent_error(now) { 1.0 } else { 0.0 };

    let score = weights.urgency * urgency
        + weights.recency * recency
        + weights.value * value
        + weights.novelty * novelty
        + weights.user_signal * signal
        + weights.error_boost * error_boost;
    score.clamp(0.0, 1.0)
}
