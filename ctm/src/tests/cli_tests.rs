//! End-to-end tests driving the CLI command paths

use super::test_utils::{test_config, test_store};
use crate::scheduler::Scheduler;
use crate::store::{StateStore, TaskFilter};
use shared::config::CtmConfig;
use shared::task::TaskStatus;
use shared::CtmError;

async fn spawn(
    store: &StateStore,
    config: &CtmConfig,
    title: &str,
    blocked_by: Vec<String>,
    switch: bool,
) -> String {
    let before = store.list_task_ids(&TaskFilter::default()).await.unwrap();
    crate::cmd_spawn(
        store,
        config,
        title.to_string(),
        None,
        Some("/work/alpha".to_string()),
        None,
        None,
        Vec::new(),
        blocked_by,
        None,
        switch,
    )
    .await
    .unwrap();
    let after = store.list_task_ids(&TaskFilter::default()).await.unwrap();
    after
        .into_iter()
        .find(|id| !before.contains(id))
        .expect("spawn created a task")
}

#[tokio::test]
async fn test_spawn_switch_complete_flow() {
    let (_dir, store) = test_store().await;
    let config = test_config();

    // Spawn with immediate switch
    let id = spawn(&store, &config, "OAuth setup", Vec::new(), true).await;
    let task = store.get_task(&id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Active);

    let sched = Scheduler::load(store.clone(), config.priority_weights)
        .await
        .unwrap();
    assert_eq!(sched.get_active(), Some(id.as_str()));
    let queue: Vec<&str> = sched.get_queue(None).iter().map(|e| e.task_id.as_str()).collect();
    assert_eq!(queue, vec![id.as_str()]);

    // Record a decision on the active task
    crate::cmd_context_add(
        &store,
        &config,
        Some("Use GitHub as provider".to_string()),
        None,
        None,
        None,
        None,
        None,
        None,
        None,
    )
    .await
    .unwrap();
    let task = store.get_task(&id).await.unwrap();
    assert_eq!(task.context.decisions.len(), 1);

    // Complete: terminal status, empty queue, consolidated record
    crate::cmd_terminal_transition(&store, &config, &id, TaskStatus::Completed, false)
        .await
        .unwrap();

    let task = store.get_task(&id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.state.progress_percent, 100);

    let sched = Scheduler::load(store.clone(), config.priority_weights)
        .await
        .unwrap();
    assert!(sched.get_queue(None).is_empty());
    assert_eq!(sched.get_active(), None);

    let decisions =
        std::fs::read_to_string(store.consolidated_dir().join("decisions.jsonl")).unwrap();
    assert_eq!(decisions.lines().count(), 1);
    assert!(decisions.contains(&id));
}

#[tokio::test]
async fn test_blocker_release_flow() {
    let (_dir, store) = test_store().await;
    let config = test_config();

    let gate = spawn(&store, &config, "Schema migration", Vec::new(), false).await;
    let gated = spawn(&store, &config, "Backfill job", vec![gate.clone()], false).await;

    // The gated task is spawned blocked and stays out of the queue
    assert_eq!(
        store.get_task(&gated).await.unwrap().status(),
        TaskStatus::Blocked
    );
    let sched = Scheduler::load(store.clone(), config.priority_weights)
        .await
        .unwrap();
    let queue: Vec<&str> = sched.get_queue(None).iter().map(|e| e.task_id.as_str()).collect();
    assert_eq!(queue, vec![gate.as_str()]);

    // Completing the gate releases the gated task
    crate::cmd_terminal_transition(&store, &config, &gate, TaskStatus::Completed, false)
        .await
        .unwrap();

    assert_eq!(
        store.get_task(&gated).await.unwrap().status(),
        TaskStatus::Active
    );
    let sched = Scheduler::load(store.clone(), config.priority_weights)
        .await
        .unwrap();
    let queue: Vec<&str> = sched.get_queue(None).iter().map(|e| e.task_id.as_str()).collect();
    assert_eq!(queue, vec![gated.as_str()]);
}

#[tokio::test]
async fn test_spawn_rejects_unknown_blocker() {
    let (_dir, store) = test_store().await;
    let config = test_config();

    let err = crate::cmd_spawn(
        &store,
        &config,
        "Orphan".to_string(),
        None,
        None,
        None,
        None,
        Vec::new(),
        vec!["zzzzzzzz".to_string()],
        None,
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmError>(),
        Some(CtmError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_spawn_rejects_empty_title() {
    let (_dir, store) = test_store().await;
    let config = test_config();
    let err = crate::cmd_spawn(
        &store, &config, "  ".to_string(), None, None, None, None, Vec::new(), Vec::new(), None,
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmError>(),
        Some(CtmError::Validation(_))
    ));
}

#[tokio::test]
async fn test_context_add_blocker_cycle_rejected() {
    let (_dir, store) = test_store().await;
    let config = test_config();

    let first = spawn(&store, &config, "First", Vec::new(), false).await;
    let second = spawn(&store, &config, "Second", vec![first.clone()], false).await;

    // Make the gate active, then try to block it on its own dependent
    crate::cmd_switch(&store, &config, &first).await.unwrap();
    let err = crate::cmd_context_add(
        &store,
        &config,
        None,
        None,
        None,
        None,
        None,
        None,
        None,
        Some(second.clone()),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmError>(),
        Some(CtmError::Validation(_))
    ));
}

#[tokio::test]
async fn test_complete_on_blocked_task_rejected() {
    let (_dir, store) = test_store().await;
    let config = test_config();

    let gate = spawn(&store, &config, "Gate", Vec::new(), false).await;
    let gated = spawn(&store, &config, "Gated", vec![gate], false).await;

    let err = crate::cmd_terminal_transition(&store, &config, &gated, TaskStatus::Completed, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmError>(),
        Some(CtmError::IllegalTransition { .. })
    ));
    assert_eq!(
        store.get_task(&gated).await.unwrap().status(),
        TaskStatus::Blocked
    );
}

#[tokio::test]
async fn test_cancel_with_discard_removes_record() {
    let (_dir, store) = test_store().await;
    let config = test_config();

    let id = spawn(&store, &config, "Short lived", Vec::new(), false).await;
    crate::cmd_terminal_transition(&store, &config, &id, TaskStatus::Cancelled, true)
        .await
        .unwrap();

    assert!(!store.task_exists(&id).await);
    let index = crate::index::load_or_rebuild(&store).await.unwrap();
    assert!(!index.contains(&id));
}

#[tokio::test]
async fn test_switch_to_unknown_task_fails() {
    let (_dir, store) = test_store().await;
    let config = test_config();
    let err = crate::cmd_switch(&store, &config, "zzzzzzzz").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmError>(),
        Some(CtmError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_deadline_parsing() {
    assert!(crate::parse_deadline("2026-09-15").is_ok());
    assert!(crate::parse_deadline("2026-09-15T12:00:00Z").is_ok());
    assert!(crate::parse_deadline("next tuesday").is_err());
    assert!(crate::parse_deadline("").is_err());
}
