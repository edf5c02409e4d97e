//! Tests for checkpoints, snapshots and leases

use super::test_utils::{make_task, test_store};
use crate::checkpoint::{Checkpoint, CheckpointKind, CheckpointManager};
use crate::store::StateStore;
use chrono::{Duration, Utc};
use shared::task::Task;

fn manager(store: &StateStore) -> CheckpointManager {
    CheckpointManager::new(store.clone(), 20, 5)
}

fn checkpoint_files(store: &StateStore, task_id: &str) -> Vec<String> {
    let prefix = format!("{}-", task_id);
    let mut names: Vec<String> = std::fs::read_dir(store.checkpoints_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(&prefix) && n.ends_with(".json"))
        .collect();
    names.sort();
    names
}

async fn stored_task(store: &StateStore, id: &str, title: &str) -> Task {
    let mut task = make_task(id, title, Utc::now());
    store.put_task(&mut task).await.unwrap();
    task
}

#[tokio::test]
async fn test_checkpoint_written_and_record_stamped() {
    let (_dir, store) = test_store().await;
    let mut task = make_task("aaaaaaaa", "OAuth setup", Utc::now());
    task.context.current_step = "wiring the callback".to_string();
    task.record_decision("Use GitHub as provider", Utc::now());
    store.put_task(&mut task).await.unwrap();

    let now = Utc::now();
    let path = manager(&store)
        .checkpoint_task(&task, CheckpointKind::Manual, now)
        .await
        .unwrap();

    let checkpoint: Checkpoint =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(checkpoint.task_id, "aaaaaaaa");
    assert_eq!(checkpoint.kind, CheckpointKind::Manual);
    assert_eq!(checkpoint.decision_count, 1);
    assert_eq!(checkpoint.current_step, "wiring the callback");

    let stored = store.get_task("aaaaaaaa").await.unwrap();
    assert_eq!(stored.state.checkpoints.len(), 1);
    assert!(stored.state.checkpoints[0].summary.starts_with("manual"));
}

#[tokio::test]
async fn test_checkpoints_pruned_to_retention_limit() {
    let (_dir, store) = test_store().await;
    let task = stored_task(&store, "aaaaaaaa", "Busy task").await;

    let manager = CheckpointManager::new(store.clone(), 2, 5);
    let base = Utc::now();
    for i in 0..4 {
        manager
            .checkpoint_task(&task, CheckpointKind::Manual, base + Duration::seconds(i))
            .await
            .unwrap();
    }

    let files = checkpoint_files(&store, "aaaaaaaa");
    assert_eq!(files.len(), 2);
    // The survivors are the two newest
    assert!(files[0].contains(&(base + Duration::seconds(2)).timestamp().to_string()));
    assert!(files[1].contains(&(base + Duration::seconds(3)).timestamp().to_string()));
}

#[tokio::test]
async fn test_snapshot_roundtrip_with_trimmed_tail() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "OAuth setup", now);
    task.goal = "Add OAuth2 login".to_string();
    for i in 0..8 {
        task.record_decision(format!("decision {}", i), now);
    }
    task.state.pending_actions.push("write tests".to_string());
    store.put_task(&mut task).await.unwrap();

    let m = manager(&store);
    m.snapshot_task(&task, now).await.unwrap();
    let snapshot = m.read_snapshot("aaaaaaaa").await.unwrap().unwrap();

    assert_eq!(snapshot.title, "OAuth setup");
    assert_eq!(snapshot.goal, "Add OAuth2 login");
    // Only the trailing five decisions survive in the snapshot
    assert_eq!(snapshot.decisions.len(), 5);
    assert_eq!(snapshot.decisions[0].text, "decision 3");
    assert_eq!(snapshot.decisions[4].text, "decision 7");
    assert_eq!(snapshot.pending_actions, vec!["write tests"]);
}

#[tokio::test]
async fn test_read_snapshot_missing_returns_none() {
    let (_dir, store) = test_store().await;
    assert!(manager(&store).read_snapshot("zzzzzzzz").await.unwrap().is_none());
}

#[tokio::test]
async fn test_lease_blocks_within_ttl() {
    let (_dir, store) = test_store().await;
    let m = manager(&store);
    let now = Utc::now();

    assert!(m.acquire_lease("pre_compact", "/work/alpha", 300, now).await.unwrap());
    assert!(!m.acquire_lease("pre_compact", "/work/alpha", 300, now).await.unwrap());
    // A different scope holds its own lease
    assert!(m.acquire_lease("pre_compact", "/work/beta", 300, now).await.unwrap());
    // A zero TTL never blocks
    assert!(m.acquire_lease("session_end", "/work/alpha", 0, now).await.unwrap());
    assert!(m.acquire_lease("session_end", "/work/alpha", 0, now).await.unwrap());
}

#[tokio::test]
async fn test_compression_trims_and_archives() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Fat context", now);
    for i in 0..40 {
        task.record_decision(format!("decision {} with a reasonably long body {}", i, "x".repeat(120)), now);
    }
    store.put_task(&mut task).await.unwrap();

    let m = manager(&store);
    let compressed = m
        .compress_context_if_needed("aaaaaaaa", 500, 10, now)
        .await
        .unwrap();
    assert!(compressed);

    let stored = store.get_task("aaaaaaaa").await.unwrap();
    assert_eq!(stored.context.decisions.len(), 10);
    assert_eq!(stored.context.decisions[0].text.split(' ').nth(1).unwrap(), "30");
    assert!(stored
        .context
        .deviations
        .iter()
        .any(|d| d.kind == "context_compressed"));

    let archive = store.snapshots_dir().join("aaaaaaaa.archive.jsonl");
    assert!(archive.exists());
    assert_eq!(std::fs::read_to_string(&archive).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn test_compression_skips_small_contexts() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let mut task = make_task("aaaaaaaa", "Lean context", now);
    task.record_decision("Use GitHub as provider", now);
    store.put_task(&mut task).await.unwrap();

    let compressed = manager(&store)
        .compress_context_if_needed("aaaaaaaa", 4_000, 10, now)
        .await
        .unwrap();
    assert!(!compressed);
    assert!(!store.snapshots_dir().join("aaaaaaaa.archive.jsonl").exists());
}
