//! Decision and learning extraction into the consolidated store
//!
//! Converts a task's episodic context into durable semantic records: an
//! append-only log of decisions and learnings keyed by task id, plus a
//! parallel log of detected contradictions. Duplicates are suppressed by a
//! stable content hash within a configurable window. Extraction is
//! best-effort throughout; it never propagates errors into the lifecycle
//! paths that invoke it.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use shared::task::Task;
use shared::utils::{fingerprint, normalize_text, significant_tokens};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::store::{StateStore, TaskFilter};

const DECISIONS_FILE: &str = "decisions.jsonl";
const LEARNINGS_FILE: &str = "learnings.jsonl";
const CONFLICTS_FILE: &str = "conflicts.jsonl";
const SESSIONS_FILE: &str = "sessions.jsonl";

// Phrase cues for mining free text. Explicitly recorded decisions and
// learnings skip the cue check but not the trivial-topic filter.
const DECISION_CUES: &[&str] = &[
    "we decided",
    "decided to",
    "going with",
    "chose",
    "switching to",
    "settled on",
    "opted for",
];
const LEARNING_CUES: &[&str] = &["learned", "turns out", "gotcha", "realized", "discovered"];

// Topics too trivial to consolidate.
const TRIVIAL_TOPICS: &[&str] = &[
    "naming",
    "rename",
    "renaming",
    "formatting",
    "format",
    "whitespace",
    "typo",
    "indentation",
];

// Verbs that carry the commitment of a decision; used by the conflict
// heuristic to compare what two decisions do to the same subject.
const DECISION_VERBS: &[&str] = &[
    "use", "using", "chose", "choose", "adopt", "adopted", "going", "switch", "switching",
    "keep", "keeping", "drop", "dropping", "settled", "opted",
];

/// Kind of a consolidated record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Decision,
    Learning,
}

/// One line of the consolidated store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsolidatedRecord {
    pub task_id: String,
    pub kind: RecordKind,
    pub text: String,
    pub at: DateTime<Utc>,
    pub hash: String,
}

/// A detected contradiction between two decisions of the same task.
/// Never auto-resolved; surfaced for a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRecord {
    pub task_id: String,
    pub first: String,
    pub second: String,
    pub shared_terms: Vec<String>,
    pub at: DateTime<Utc>,
    pub hash: String,
}

/// One line of the session summary log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummaryRecord {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub project: String,
    pub switches: u32,
    pub checkpoints: u32,
    pub tasks_touched: usize,
}

/// Per-task outcome of an extraction pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExtractionReport {
    pub task_id: String,
    pub decisions_added: usize,
    pub learnings_added: usize,
    pub duplicates_suppressed: usize,
    pub conflicts_found: usize,
}

/// The extraction engine.
pub struct Extractor {
    store: StateStore,
    dedup_window_days: i64,
    parallelism: usize,
}

impl Extractor {
    pub fn new(store: StateStore, dedup_window_days: i64, parallelism: usize) -> Self {
        Self {
            store,
            dedup_window_days,
            parallelism: parallelism.max(1),
        }
    }

    fn consolidated_path(&self, file: &str) -> PathBuf {
        self.store.consolidated_dir().join(file)
    }

    /// Run extraction for one task and append the new records.
    pub async fn extract_task(&self, task: &Task, now: DateTime<Utc>) -> Result<ExtractionReport> {
        let seen = self.load_recent_hashes(now).await?;
        let (records, conflicts, mut report) = extract_candidates(task, &seen, now);
        self.append_records(&records, &conflicts).await?;
        report.conflicts_found = conflicts.len();
        Ok(report)
    }

    /// Session-end sweep: extract every task active within the window.
    /// Candidate mining runs with bounded concurrency; the appends are
    /// serialized so log lines never interleave.
    pub async fn extract_recent(
        &self,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExtractionReport>> {
        let ids = self
            .store
            .list_task_ids(&TaskFilter {
                active_within_seconds: Some(window_seconds),
                ..TaskFilter::default()
            })
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = self.load_recent_hashes(now).await?;
        let store = self.store.clone();
        let outcomes: Vec<Option<(Vec<ConsolidatedRecord>, Vec<ConflictRecord>, ExtractionReport)>> =
            stream::iter(ids.into_iter())
                .map(|id| {
                    let store = store.clone();
                    let seen = seen.clone();
                    async move {
                        match store.get_task(&id).await {
                            Ok(task) => Some(extract_candidates(&task, &seen, now)),
                            Err(e) => {
                                warn!(id = %id, error = %e, "skipping task during extraction sweep");
                                None
                            }
                        }
                    }
                })
                .buffer_unordered(self.parallelism)
                .collect()
                .await;

        let mut reports = Vec::new();
        let mut all_records = Vec::new();
        let mut all_conflicts = Vec::new();
        for (records, conflicts, mut report) in outcomes.into_iter().flatten() {
            // The sweep shares one hash set, so a record surfaced twice in
            // the same pass still deduplicates here.
            for record in records {
                if seen.insert(record.hash.clone()) {
                    all_records.push(record);
                } else {
                    report.duplicates_suppressed += 1;
                    match record.kind {
                        RecordKind::Decision => report.decisions_added -= 1,
                        RecordKind::Learning => report.learnings_added -= 1,
                    }
                }
            }
            report.conflicts_found = conflicts.len();
            all_conflicts.extend(conflicts);
            reports.push(report);
        }

        self.append_records(&all_records, &all_conflicts).await?;
        Ok(reports)
    }

    /// Append a session summary line to the consolidated store.
    pub async fn append_session_summary(&self, record: &SessionSummaryRecord) -> Result<()> {
        self.append_lines(&self.consolidated_path(SESSIONS_FILE), &[serde_json::to_string(record)?])
            .await
    }

    /// Hashes of consolidated records younger than the dedup window.
    async fn load_recent_hashes(&self, now: DateTime<Utc>) -> Result<HashSet<String>> {
        let cutoff = now - Duration::days(self.dedup_window_days);
        let mut hashes = HashSet::new();
        for file in [DECISIONS_FILE, LEARNINGS_FILE] {
            let path = self.consolidated_path(file);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read consolidated log");
                    continue;
                }
            };
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ConsolidatedRecord>(line) {
                    Ok(record) if record.at >= cutoff => {
                        hashes.insert(record.hash);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(path = %path.display(), error = %e, "skipping malformed log line"),
                }
            }
        }
        Ok(hashes)
    }

    async fn append_records(
        &self,
        records: &[ConsolidatedRecord],
        conflicts: &[ConflictRecord],
    ) -> Result<()> {
        let mut decisions = Vec::new();
        let mut learnings = Vec::new();
        for record in records {
            let line = serde_json::to_string(record)?;
            match record.kind {
                RecordKind::Decision => decisions.push(line),
                RecordKind::Learning => learnings.push(line),
            }
        }
        self.append_lines(&self.consolidated_path(DECISIONS_FILE), &decisions)
            .await?;
        self.append_lines(&self.consolidated_path(LEARNINGS_FILE), &learnings)
            .await?;

        // Conflicts persist across runs, so re-detections are filtered
        // against what the log already holds.
        let known = self.load_conflict_hashes().await;
        let conflict_lines: Vec<String> = conflicts
            .iter()
            .filter(|c| !known.contains(&c.hash))
            .map(serde_json::to_string)
            .collect::<std::result::Result<_, _>>()?;
        self.append_lines(&self.consolidated_path(CONFLICTS_FILE), &conflict_lines)
            .await?;
        Ok(())
    }

    /// Hashes of every conflict already logged.
    async fn load_conflict_hashes(&self) -> HashSet<String> {
        let path = self.consolidated_path(CONFLICTS_FILE);
        let mut hashes = HashSet::new();
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            for line in content.lines() {
                if let Ok(record) = serde_json::from_str::<ConflictRecord>(line.trim()) {
                    hashes.insert(record.hash);
                }
            }
        }
        hashes
    }

    async fn append_lines(&self, path: &PathBuf, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Pure candidate extraction for one task against a set of known hashes.
fn extract_candidates(
    task: &Task,
    seen: &HashSet<String>,
    now: DateTime<Utc>,
) -> (Vec<ConsolidatedRecord>, Vec<ConflictRecord>, ExtractionReport) {
    let mut report = ExtractionReport {
        task_id: task.id.clone(),
        ..ExtractionReport::default()
    };
    let mut records = Vec::new();
    let mut batch_hashes = HashSet::new();

    let mut decision_texts: Vec<String> = Vec::new();

    // Explicit decisions, minus trivia
    for entry in &task.context.decisions {
        if is_trivial(&entry.text) {
            continue;
        }
        decision_texts.push(entry.text.clone());
    }
    // Mined decision-like statements from the free-text fields
    for line in free_text_lines(task) {
        if has_cue(&line, DECISION_CUES) && !is_trivial(&line) {
            decision_texts.push(line);
        }
    }

    for text in &decision_texts {
        let hash = fingerprint(&task.id, text);
        if seen.contains(&hash) || !batch_hashes.insert(hash.clone()) {
            report.duplicates_suppressed += 1;
            continue;
        }
        records.push(ConsolidatedRecord {
            task_id: task.id.clone(),
            kind: RecordKind::Decision,
            text: text.clone(),
            at: now,
            hash,
        });
        report.decisions_added += 1;
    }

    // Learnings: the explicit list, mined statements, and the latest error
    let mut learning_texts: Vec<String> = task
        .context
        .learnings
        .iter()
        .map(|l| l.text.clone())
        .collect();
    for line in free_text_lines(task) {
        if has_cue(&line, LEARNING_CUES) {
            learning_texts.push(line);
        }
    }
    if let Some(error) = &task.state.last_error {
        learning_texts.push(format!("error: {}", error.message));
    }

    for text in &learning_texts {
        let hash = fingerprint(&task.id, text);
        if seen.contains(&hash) || !batch_hashes.insert(hash.clone()) {
            report.duplicates_suppressed += 1;
            continue;
        }
        records.push(ConsolidatedRecord {
            task_id: task.id.clone(),
            kind: RecordKind::Learning,
            text: text.clone(),
            at: now,
            hash,
        });
        report.learnings_added += 1;
    }

    let conflicts = detect_conflicts(&task.id, &decision_texts, now);
    (records, conflicts, report)
}

/// Lines of free text worth mining: the current step and pending actions.
fn free_text_lines(task: &Task) -> Vec<String> {
    let mut lines = Vec::new();
    for line in task.context.current_step.lines() {
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    for action in &task.state.pending_actions {
        let action = action.trim();
        if !action.is_empty() {
            lines.push(action.to_string());
        }
    }
    lines
}

fn has_cue(text: &str, cues: &[&str]) -> bool {
    let normalized = normalize_text(text);
    let padded = format!(" {} ", normalized);
    cues.iter()
        .any(|cue| padded.contains(&format!(" {} ", cue)))
}

fn is_trivial(text: &str) -> bool {
    let tokens = significant_tokens(text);
    tokens.iter().any(|t| TRIVIAL_TOPICS.contains(&t.as_str()))
}

/// Flag pairs of decisions whose subject terms overlap while their
/// commitment verbs differ. Heuristic by design: false positives are
/// surfaced to a human, never auto-resolved.
fn detect_conflicts(task_id: &str, decisions: &[String], now: DateTime<Utc>) -> Vec<ConflictRecord> {
    let analyzed: Vec<(String, Option<String>, HashSet<String>)> = decisions
        .iter()
        .map(|text| {
            let tokens = significant_tokens(text);
            let verb = tokens
                .iter()
                .find(|t| DECISION_VERBS.contains(&t.as_str()))
                .cloned();
            let subjects: HashSet<String> = tokens
                .into_iter()
                .filter(|t| !DECISION_VERBS.contains(&t.as_str()))
                .collect();
            (text.clone(), verb, subjects)
        })
        .collect();

    let mut conflicts = Vec::new();
    for i in 0..analyzed.len() {
        for j in (i + 1)..analyzed.len() {
            let (text_a, verb_a, subjects_a) = &analyzed[i];
            let (text_b, verb_b, subjects_b) = &analyzed[j];
            let (Some(va), Some(vb)) = (verb_a, verb_b) else {
                continue;
            };
            if va == vb {
                continue;
            }
            let mut shared: Vec<String> =
                subjects_a.intersection(subjects_b).cloned().collect();
            if shared.is_empty() {
                continue;
            }
            shared.sort();
            let hash = fingerprint(task_id, &format!("{}|{}", text_a, text_b));
            conflicts.push(ConflictRecord {
                task_id: task_id.to_string(),
                first: text_a.clone(),
                second: text_b.clone(),
                shared_terms: shared,
                at: now,
                hash,
            });
        }
    }
    conflicts
}
