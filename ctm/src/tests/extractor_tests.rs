//! Tests for extraction into the consolidated store

use super::test_utils::{make_task, test_store};
use crate::extractor::{ConsolidatedRecord, Extractor, SessionSummaryRecord};
use crate::store::StateStore;
use chrono::Utc;
use shared::task::Task;

fn extractor(store: &StateStore) -> Extractor {
    Extractor::new(store.clone(), 30, 1)
}

fn read_lines(path: &std::path::Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().map(|l| l.to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

fn task_with_context(id: &str) -> Task {
    let now = Utc::now();
    let mut task = make_task(id, "OAuth setup", now);
    task.record_decision("Use GitHub as provider", now);
    task.record_learning("Device flow needs no client secret", now);
    task
}

#[tokio::test]
async fn test_extract_appends_decisions_and_learnings() {
    let (_dir, store) = test_store().await;
    let task = task_with_context("aaaaaaaa");

    let report = extractor(&store)
        .extract_task(&task, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.decisions_added, 1);
    assert_eq!(report.learnings_added, 1);
    assert_eq!(report.duplicates_suppressed, 0);

    let decisions = read_lines(&store.consolidated_dir().join("decisions.jsonl"));
    assert_eq!(decisions.len(), 1);
    let record: ConsolidatedRecord = serde_json::from_str(&decisions[0]).unwrap();
    assert_eq!(record.task_id, "aaaaaaaa");
    assert_eq!(record.text, "Use GitHub as provider");
    assert_eq!(record.hash.len(), 64);

    let learnings = read_lines(&store.consolidated_dir().join("learnings.jsonl"));
    assert_eq!(learnings.len(), 1);
}

#[tokio::test]
async fn test_extraction_is_idempotent() {
    let (_dir, store) = test_store().await;
    let task = task_with_context("aaaaaaaa");
    let ex = extractor(&store);

    ex.extract_task(&task, Utc::now()).await.unwrap();
    let second = ex.extract_task(&task, Utc::now()).await.unwrap();

    assert_eq!(second.decisions_added, 0);
    assert_eq!(second.learnings_added, 0);
    assert!(second.duplicates_suppressed >= 2);

    assert_eq!(read_lines(&store.consolidated_dir().join("decisions.jsonl")).len(), 1);
    assert_eq!(read_lines(&store.consolidated_dir().join("learnings.jsonl")).len(), 1);
}

#[tokio::test]
async fn test_trivial_topics_excluded() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Cleanup", now);
    task.record_decision("Rename the helper for clarity", now);
    task.record_decision("Fix formatting in the config module", now);
    task.record_decision("Use sqlite for the cache", now);

    let report = extractor(&store)
        .extract_task(&task, now)
        .await
        .unwrap();
    assert_eq!(report.decisions_added, 1);

    let decisions = read_lines(&store.consolidated_dir().join("decisions.jsonl"));
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].contains("sqlite"));
}

#[tokio::test]
async fn test_mines_cues_from_free_text() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Cache layer", now);
    task.context.current_step = "We decided to use sqlite for the cache\nwiring it up now".to_string();
    task.state
        .pending_actions
        .push("turns out the eviction hook fires twice".to_string());

    let report = extractor(&store)
        .extract_task(&task, now)
        .await
        .unwrap();
    assert_eq!(report.decisions_added, 1);
    assert_eq!(report.learnings_added, 1);
}

#[tokio::test]
async fn test_last_error_recorded_as_learning() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Flaky build", now);
    task.record_error("linker ran out of memory", now);

    let report = extractor(&store)
        .extract_task(&task, now)
        .await
        .unwrap();
    assert_eq!(report.learnings_added, 1);

    let learnings = read_lines(&store.consolidated_dir().join("learnings.jsonl"));
    assert!(learnings[0].contains("linker ran out of memory"));
}

#[tokio::test]
async fn test_conflicting_decisions_flagged_once() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Storage", now);
    task.record_decision("Use Postgres for metrics storage", now);
    task.record_decision("Switching to ClickHouse for metrics storage", now);

    let ex = extractor(&store);
    let report = ex.extract_task(&task, now).await.unwrap();
    assert_eq!(report.conflicts_found, 1);

    let conflicts = read_lines(&store.consolidated_dir().join("conflicts.jsonl"));
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].contains("metrics"));

    // A second pass re-detects but does not re-append
    ex.extract_task(&task, now).await.unwrap();
    assert_eq!(read_lines(&store.consolidated_dir().join("conflicts.jsonl")).len(), 1);
}

#[tokio::test]
async fn test_agreeing_decisions_not_flagged() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Storage", now);
    task.record_decision("Use Postgres for metrics storage", now);
    task.record_decision("Use pgbouncer in front of it", now);

    let report = extractor(&store)
        .extract_task(&task, now)
        .await
        .unwrap();
    // Same commitment verb, so no contradiction is reported
    assert_eq!(report.conflicts_found, 0);
}

#[tokio::test]
async fn test_sweep_covers_recent_tasks() {
    let (_dir, store) = test_store().await;
    let mut a = task_with_context("aaaaaaaa");
    store.put_task(&mut a).await.unwrap();
    let mut b = task_with_context("bbbbbbbb");
    store.put_task(&mut b).await.unwrap();

    let reports = extractor(&store)
        .extract_recent(3_600, Utc::now())
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    let total: usize = reports.iter().map(|r| r.decisions_added).sum();
    assert_eq!(total, 2);

    // Identical text under different task ids still fingerprints apart
    assert_eq!(read_lines(&store.consolidated_dir().join("decisions.jsonl")).len(), 2);
}

#[tokio::test]
async fn test_sweep_respects_window() {
    let (_dir, store) = test_store().await;
    let mut old = task_with_context("aaaaaaaa");
    old.timing.last_active = Utc::now() - chrono::Duration::hours(5);
    store.put_task(&mut old).await.unwrap();

    let reports = extractor(&store)
        .extract_recent(3_600, Utc::now())
        .await
        .unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn test_session_summary_appended() {
    let (_dir, store) = test_store().await;
    let record = SessionSummaryRecord {
        start: Some(Utc::now()),
        end: Utc::now(),
        project: "/work/alpha".to_string(),
        switches: 3,
        checkpoints: 2,
        tasks_touched: 4,
    };
    let ex = extractor(&store);
    ex.append_session_summary(&record).await.unwrap();
    ex.append_session_summary(&record).await.unwrap();

    let lines = read_lines(&store.consolidated_dir().join("sessions.jsonl"));
    assert_eq!(lines.len(), 2);
    let back: SessionSummaryRecord = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(back.switches, 3);
}
