//! Lifecycle orchestration for session hooks
//!
//! Translates the host environment's lifecycle events (session start and
//! end, pre-compaction, each user prompt) into ordered invocations of the
//! engine components. Every step is fail-silent: a failure or a soft
//! timeout is logged and the remaining steps still run, so a broken disk or
//! a conflicted record can never take a hook down with it.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use shared::config::CtmConfig;
use shared::task::{Task, TaskStatus};
use shared::utils::{generate_task_id, truncate_string};
use std::fmt::Write as _;
use std::future::Future;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointKind, CheckpointManager};
use crate::extractor::{Extractor, SessionSummaryRecord};
use crate::index::{self, TaskIndex};
use crate::scheduler::Scheduler;
use crate::store::StateStore;
use crate::triggers::{TriggerCandidate, TriggerDetector, TriggerKind};
use crate::working_memory::{WorkingMemory, WorkingMemoryState};

/// Orchestrates the lifecycle entry points over one engine root.
pub struct Orchestrator {
    store: StateStore,
    config: CtmConfig,
}

impl Orchestrator {
    pub fn new(store: StateStore, config: CtmConfig) -> Self {
        Self { store, config }
    }

    fn checkpoints(&self) -> CheckpointManager {
        CheckpointManager::new(
            self.store.clone(),
            self.config.checkpoint_keep,
            self.config.context_tail_len,
        )
    }

    fn extractor(&self) -> Extractor {
        Extractor::new(
            self.store.clone(),
            self.config.dedup_window_days,
            self.config.extract_parallelism,
        )
    }

    /// Run one orchestrator step under the soft timeout. Failures and
    /// timeouts are logged and reported as `None`; the caller moves on.
    async fn step<T, F>(&self, name: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = std::time::Duration::from_secs(self.config.step_timeout_seconds);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(step = name, error = %e, "orchestrator step failed, continuing");
                None
            }
            Err(_) => {
                warn!(step = name, timeout_secs = self.config.step_timeout_seconds, "orchestrator step timed out, continuing");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // session_start
    // ------------------------------------------------------------------

    /// Session start: repair the index, open the session, rank the queue,
    /// warm working memory, and return the briefing.
    pub async fn session_start(&self, working_dir: &str) -> String {
        let now = Utc::now();

        let mut index = self
            .step("rebuild_index", index::rebuild(&self.store))
            .await
            .unwrap_or_default();

        let resumed = if self.config.auto_resume {
            self.step(
                "find_or_create_project_task",
                self.find_or_create_project_task(&mut index, working_dir, now),
            )
            .await
            .flatten()
        } else {
            None
        };

        let mut scheduler = match self
            .step(
                "load_scheduler",
                Scheduler::load(self.store.clone(), self.config.priority_weights),
            )
            .await
        {
            Some(s) => s,
            None => return "task engine unavailable".to_string(),
        };
        scheduler.start_session(working_dir, now);
        self.step("rebuild_queue", scheduler.rebuild_queue(now)).await;
        self.step("persist_scheduler", scheduler.persist()).await;

        let warmed = self
            .step("warm_working_memory", self.warm_working_memory(&scheduler, now))
            .await
            .unwrap_or_default();

        self.step(
            "briefing",
            self.briefing(&scheduler, &index, resumed.as_deref(), &warmed, now),
        )
        .await
        .unwrap_or_else(|| "no briefing available".to_string())
    }

    /// Build a briefing from the current state without opening a session.
    /// Used by the `brief` CLI verb.
    pub async fn brief(&self) -> String {
        let now = Utc::now();
        let index = self
            .step("load_index", index::load_or_rebuild(&self.store))
            .await
            .unwrap_or_default();
        let mut scheduler = match self
            .step(
                "load_scheduler",
                Scheduler::load(self.store.clone(), self.config.priority_weights),
            )
            .await
        {
            Some(s) => s,
            None => return "task engine unavailable".to_string(),
        };
        self.step("rebuild_queue", scheduler.rebuild_queue(now)).await;
        self.step("persist_scheduler", scheduler.persist()).await;
        self.step("briefing", self.briefing(&scheduler, &index, None, &[], now))
            .await
            .unwrap_or_else(|| "no briefing available".to_string())
    }

    /// Admit the top of the queue into working memory. Returns the ids
    /// actually loaded.
    async fn warm_working_memory(
        &self,
        scheduler: &Scheduler,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let state: WorkingMemoryState = self
            .store
            .read_state(&self.store.working_memory_path())
            .await?;
        let mut wm = WorkingMemory::new(
            state,
            self.config.max_hot_tasks,
            self.config.token_budget,
            self.config.context_tail_len,
        );

        let mut warmed = Vec::new();
        for entry in scheduler.get_queue(Some(self.config.warm_start_tasks)) {
            match self.store.get_task(&entry.task_id).await {
                Ok(task) => {
                    let (outcome, _) = wm.load(&task, now);
                    if matches!(outcome, crate::working_memory::LoadOutcome::Loaded) {
                        warmed.push(task.id);
                    }
                }
                Err(e) => warn!(id = %entry.task_id, error = %e, "cannot warm task"),
            }
        }
        wm.manage_pressure();
        self.store
            .write_state(&self.store.working_memory_path(), &wm.into_state())
            .await?;
        Ok(warmed)
    }

    /// Find a live task for the working directory, creating one when the
    /// directory has none. Returns the task id involved, if any.
    async fn find_or_create_project_task(
        &self,
        index: &mut TaskIndex,
        working_dir: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        if working_dir.is_empty() {
            return Ok(None);
        }
        if let Some(entry) = index
            .live_entries()
            .find(|e| e.project == working_dir)
        {
            return Ok(Some(entry.id.clone()));
        }

        let name = std::path::Path::new(working_dir)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(working_dir);
        let mut task = Task::new(generate_task_id(), format!("Work in {}", name), now);
        task.context.project = working_dir.to_string();
        task.priority.level = shared::task::PriorityLevel::Background;
        self.store.put_task(&mut task).await?;
        index.upsert(&task);
        self.store
            .write_state(&self.store.index_path(), index)
            .await?;
        info!(id = %task.id, project = working_dir, "created task for working directory");
        Ok(Some(task.id))
    }

    /// Build the multi-section session briefing.
    async fn briefing(
        &self,
        scheduler: &Scheduler,
        index: &TaskIndex,
        resumed: Option<&str>,
        warmed: &[String],
        now: DateTime<Utc>,
    ) -> Result<String> {
        let mut out = String::new();

        match scheduler.get_active() {
            Some(id) => match self.store.get_task(id).await {
                Ok(task) => {
                    writeln!(out, "Active: [{}] {} ({}%)", task.id, task.title, task.state.progress_percent)?;
                    if !task.context.current_step.is_empty() {
                        writeln!(out, "  Next: {}", truncate_string(&task.context.current_step, 100))?;
                    }
                }
                Err(_) => writeln!(out, "Active: [{}] (record unavailable)", id)?,
            },
            None => writeln!(out, "Active: none")?,
        }

        let queue = scheduler.get_queue(Some(5));
        if queue.is_empty() {
            writeln!(out, "Queue: empty")?;
        } else {
            writeln!(out, "Queue:")?;
            for entry in queue {
                let title = index
                    .get(&entry.task_id)
                    .map(|e| e.title.as_str())
                    .unwrap_or("?");
                writeln!(out, "  {:.3}  [{}] {}", entry.score, entry.task_id, title)?;
            }
        }

        if !warmed.is_empty() {
            writeln!(out, "Warm: {}", warmed.join(", "))?;
        }

        let stale_cutoff = now - Duration::days(self.config.stale_after_days);
        let stale: Vec<&str> = index
            .entries
            .values()
            .filter(|e| e.status == TaskStatus::Paused && e.last_active < stale_cutoff)
            .map(|e| e.id.as_str())
            .collect();
        if !stale.is_empty() {
            writeln!(
                out,
                "Stale: {} paused task(s) idle for over {} days: {}",
                stale.len(),
                self.config.stale_after_days,
                stale.join(", ")
            )?;
        }

        if let Some(id) = resumed {
            writeln!(out, "Resume: task [{}] matches this directory; `ctm switch {}` to pick it up", id, id)?;
        }

        Ok(out.trim_end().to_string())
    }

    // ------------------------------------------------------------------
    // pre_compact
    // ------------------------------------------------------------------

    /// Pre-compaction: checkpoint the active task, relieve memory pressure,
    /// snapshot, and compress oversized contexts. Duplicate firings within
    /// the lease TTL are no-ops.
    pub async fn pre_compact(&self, working_dir: &str) -> String {
        let now = Utc::now();
        let manager = self.checkpoints();

        match manager
            .acquire_lease("pre_compact", working_dir, self.config.lease_ttl_seconds, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => return "pre-compact skipped (recent)".to_string(),
            Err(e) => {
                warn!(error = %e, "lease check failed, proceeding anyway");
            }
        }

        let mut scheduler = match self
            .step(
                "load_scheduler",
                Scheduler::load(self.store.clone(), self.config.priority_weights),
            )
            .await
        {
            Some(s) => s,
            None => return "pre-compact failed".to_string(),
        };

        let Some(active_id) = scheduler.get_active().map(str::to_string) else {
            return "pre-compact: no active task".to_string();
        };

        let mut checkpointed = false;
        if let Some(task) = self.step("load_active", self.store.get_task(&active_id)).await {
            if self
                .step(
                    "checkpoint_active",
                    manager.checkpoint_task(&task, CheckpointKind::PreCompact, now),
                )
                .await
                .is_some()
            {
                scheduler.note_checkpoint();
                checkpointed = true;
            }
            self.step("snapshot_active", manager.snapshot_task(&task, now))
                .await;
        }

        self.step(
            "compress_context",
            manager.compress_context_if_needed(
                &active_id,
                self.config.compress_threshold_tokens,
                self.config.compress_keep_tail,
                now,
            ),
        )
        .await;

        self.step("relieve_pressure", self.relieve_pressure()).await;
        self.step("persist_scheduler", scheduler.persist()).await;

        if checkpointed {
            format!("pre-compact: checkpointed task {}", active_id)
        } else {
            format!("pre-compact: task {} not checkpointed", active_id)
        }
    }

    /// Evict terminal tasks and enforce working memory bounds.
    async fn relieve_pressure(&self) -> Result<usize> {
        let state: WorkingMemoryState = self
            .store
            .read_state(&self.store.working_memory_path())
            .await?;
        let mut wm = WorkingMemory::new(
            state,
            self.config.max_hot_tasks,
            self.config.token_budget,
            self.config.context_tail_len,
        );

        let mut evicted = 0;
        let loaded: Vec<String> = wm.slots().iter().map(|s| s.task_id.clone()).collect();
        for id in loaded {
            // A slot whose record is terminal or unreadable has no business
            // staying hot
            let terminal = match self.store.get_task(&id).await {
                Ok(task) => task.is_terminal(),
                Err(_) => true,
            };
            if terminal && wm.evict(&id) {
                evicted += 1;
            }
        }
        evicted += wm.manage_pressure().len();
        self.store
            .write_state(&self.store.working_memory_path(), &wm.into_state())
            .await?;
        Ok(evicted)
    }

    // ------------------------------------------------------------------
    // on_user_prompt
    // ------------------------------------------------------------------

    /// Inspect an utterance for triggers and return a suggestion for the
    /// user. Never switches or mutates anything by itself.
    pub async fn on_user_prompt(&self, utterance: &str) -> Option<String> {
        let index = self
            .step("load_index", index::load_or_rebuild(&self.store))
            .await?;
        let scheduler = self
            .step(
                "load_scheduler",
                Scheduler::load(self.store.clone(), self.config.priority_weights),
            )
            .await?;
        let active = scheduler.get_active();

        let candidates: Vec<TriggerCandidate> = index
            .live_entries()
            .map(|e| TriggerCandidate {
                task_id: e.id.clone(),
                title: e.title.clone(),
                phrases: e.trigger_phrases.clone(),
            })
            .collect();

        let detector = TriggerDetector::new(self.config.trigger_min_confidence);
        let matches = detector.detect(utterance, &candidates);
        let top = matches
            .iter()
            .find(|m| m.confidence >= self.config.trigger_act_confidence)?;

        let title_of = |id: &str| {
            index
                .get(id)
                .map(|e| e.title.clone())
                .unwrap_or_else(|| "?".to_string())
        };

        match top.kind {
            TriggerKind::Switch => {
                let target = top.target_task_id.as_deref()?;
                if Some(target) == active {
                    return None;
                }
                Some(format!(
                    "This sounds like task [{}] {}; run `ctm switch {}` to make it active",
                    target,
                    title_of(target),
                    target
                ))
            }
            TriggerKind::Complete => {
                let target = top.target_task_id.as_deref().or(active)?;
                Some(format!(
                    "Sounds like task [{}] {} may be finished; run `ctm complete {}` when ready",
                    target,
                    title_of(target),
                    target
                ))
            }
            TriggerKind::Escalate => {
                let target = top.target_task_id.as_deref().or(active)?;
                Some(format!(
                    "Urgency noted for task [{}]; `ctm context add --signal 1` boosts its priority",
                    target
                ))
            }
            TriggerKind::Park => {
                let target = top.target_task_id.as_deref().or(active)?;
                Some(format!(
                    "Parking task [{}]? A switch to another task will pause its accounting",
                    target
                ))
            }
            TriggerKind::Drift => {
                active.map(|id| {
                    format!(
                        "Tangent noted; task [{}] stays active. Spawn a new task if this grows",
                        id
                    )
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // session_end
    // ------------------------------------------------------------------

    /// Session end: persist every touched task, checkpoint them, run the
    /// extraction sweep, relieve pressure, and append the session summary.
    pub async fn session_end(&self, working_dir: &str) -> String {
        let now = Utc::now();
        let manager = self.checkpoints();

        match manager
            .acquire_lease("session_end", working_dir, self.config.lease_ttl_seconds, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => return "session-end skipped (recent)".to_string(),
            Err(e) => warn!(error = %e, "lease check failed, proceeding anyway"),
        }

        let mut scheduler = match self
            .step(
                "load_scheduler",
                Scheduler::load(self.store.clone(), self.config.priority_weights),
            )
            .await
        {
            Some(s) => s,
            None => return "session-end failed".to_string(),
        };

        let touched = self
            .step(
                "list_touched",
                self.store.list_task_ids(&crate::store::TaskFilter {
                    active_within_seconds: Some(self.config.session_window_seconds),
                    ..Default::default()
                }),
            )
            .await
            .unwrap_or_default();

        let mut checkpoints = 0usize;
        for id in &touched {
            let Some(task) = self.step("load_touched", self.store.get_task(id)).await else {
                continue;
            };
            if task.is_terminal() {
                continue;
            }
            if self
                .step(
                    "checkpoint_touched",
                    manager.checkpoint_task(&task, CheckpointKind::SessionEnd, now),
                )
                .await
                .is_some()
            {
                scheduler.note_checkpoint();
                checkpoints += 1;
            }
            if matches!(task.status(), TaskStatus::Active | TaskStatus::Paused) {
                self.step("snapshot_touched", manager.snapshot_task(&task, now))
                    .await;
            }
        }

        let reports = self
            .step(
                "extract_recent",
                self.extractor()
                    .extract_recent(self.config.session_window_seconds, now),
            )
            .await
            .unwrap_or_default();
        let extracted: usize = reports
            .iter()
            .map(|r| r.decisions_added + r.learnings_added)
            .sum();

        self.step("relieve_pressure", self.relieve_pressure()).await;

        let session_start = scheduler.state.session.start;
        let stats = self
            .step(
                "end_session",
                scheduler.end_session(now, self.config.session_window_seconds),
            )
            .await;
        self.step("persist_scheduler", scheduler.persist()).await;

        if let Some(stats) = &stats {
            let record = SessionSummaryRecord {
                start: session_start,
                end: now,
                project: working_dir.to_string(),
                switches: stats.switches,
                checkpoints: stats.checkpoints,
                tasks_touched: stats.tasks_touched,
            };
            self.step(
                "append_session_summary",
                self.extractor().append_session_summary(&record),
            )
            .await;
        }

        match stats {
            Some(stats) => format!(
                "session ended: {} task(s) touched, {} checkpoint(s), {} record(s) extracted, {} switch(es)",
                touched.len(),
                checkpoints,
                extracted,
                stats.switches
            ),
            None => format!(
                "session ended: {} task(s) touched, {} checkpoint(s), {} record(s) extracted",
                touched.len(),
                checkpoints,
                extracted
            ),
        }
    }
}
