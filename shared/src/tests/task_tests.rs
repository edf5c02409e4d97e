//! Tests for the task record data model

use crate::task::{Task, TaskStatus, TOKENS_PER_CHAR};
use crate::CtmError;
use chrono::{Duration, Utc};

fn sample_task() -> Task {
    Task::new("abcdefgh", "OAuth setup", Utc::now())
}

#[test]
fn test_new_task_defaults() {
    let task = sample_task();
    assert_eq!(task.status(), TaskStatus::Active);
    assert_eq!(task.state.progress_percent, 0);
    assert_eq!(task.version, 0);
    assert_eq!(task.priority.urgency, 0.5);
    assert_eq!(task.priority.value, 0.5);
    assert_eq!(task.priority.novelty, 1.0);
    assert_eq!(task.priority.user_signal, 0.0);
    assert!(task.timing.deadline.is_none());
    assert!(!task.is_terminal());
}

#[test]
fn test_valid_transitions() {
    let mut task = sample_task();
    task.transition(TaskStatus::Paused).unwrap();
    task.transition(TaskStatus::Active).unwrap();
    task.transition(TaskStatus::Blocked).unwrap();
    task.transition(TaskStatus::Active).unwrap();
    task.transition(TaskStatus::Completed).unwrap();
    assert!(task.is_terminal());

    let mut task = sample_task();
    task.transition(TaskStatus::Paused).unwrap();
    task.transition(TaskStatus::Cancelled).unwrap();
    assert!(task.is_terminal());
}

#[test]
fn test_invalid_transitions_rejected() {
    // Terminal states are dead ends
    let mut task = sample_task();
    task.transition(TaskStatus::Completed).unwrap();
    let err = task.transition(TaskStatus::Active).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmError>(),
        Some(CtmError::IllegalTransition { .. })
    ));
    // The failed transition must not mutate the record
    assert_eq!(task.status(), TaskStatus::Completed);

    // Blocked tasks cannot complete without passing through active
    let mut task = sample_task();
    task.transition(TaskStatus::Blocked).unwrap();
    assert!(task.transition(TaskStatus::Completed).is_err());
    assert_eq!(task.status(), TaskStatus::Blocked);

    // Paused tasks cannot be blocked directly
    let mut task = sample_task();
    task.transition(TaskStatus::Paused).unwrap();
    assert!(task.transition(TaskStatus::Blocked).is_err());
}

#[test]
fn test_self_transition_is_noop() {
    let mut task = sample_task();
    task.transition(TaskStatus::Active).unwrap();
    assert_eq!(task.status(), TaskStatus::Active);
}

#[test]
fn test_progress_clamped() {
    let mut task = sample_task();
    task.set_progress(250);
    assert_eq!(task.state.progress_percent, 100);
    task.set_progress(42);
    assert_eq!(task.state.progress_percent, 42);
}

#[test]
fn test_key_file_deduplication() {
    let mut task = sample_task();
    task.record_key_file("src/auth.rs");
    task.record_key_file("src/main.rs");
    task.record_key_file("src/auth.rs");
    assert_eq!(task.context.key_files, vec!["src/auth.rs", "src/main.rs"]);
}

#[test]
fn test_recent_error_window() {
    let now = Utc::now();
    let mut task = sample_task();
    assert!(!task.has_recent_error(now));

    task.record_error("build failed", now - Duration::hours(2));
    assert!(task.has_recent_error(now));

    task.record_error("build failed", now - Duration::hours(25));
    assert!(!task.has_recent_error(now));
}

#[test]
fn test_token_estimate_counts_quarter_token_per_char() {
    let now = Utc::now();
    let mut task = Task::new("abcdefgh", "abcd", now); // 4 chars
    task.goal = "efghijkl".to_string(); // 8 chars
    task.context.current_step = "mnop".to_string(); // 4 chars

    // 16 chars at 0.25 tokens each
    assert_eq!(task.token_estimate(5), (16.0 * TOKENS_PER_CHAR) as u32);
}

#[test]
fn test_token_estimate_only_counts_trailing_entries() {
    let now = Utc::now();
    let mut task = Task::new("abcdefgh", "", now);
    for i in 0..10 {
        task.record_decision(format!("decision {}", i), now); // 10 chars each
    }
    // Only the last two decisions contribute: 20 chars -> 5 tokens
    assert_eq!(task.token_estimate(2), 5);
}

#[test]
fn test_legacy_record_deserializes_at_version_zero() {
    // A record written before versioning carries no version field
    let json = format!(
        r#"{{
            "id": "abcdefgh",
            "title": "Legacy task",
            "timing": {{
                "created_at": "{now}",
                "last_active": "{now}"
            }}
        }}"#,
        now = Utc::now().to_rfc3339()
    );
    let task: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(task.version, 0);
    assert_eq!(task.schema_version, crate::task::SCHEMA_VERSION);
    assert_eq!(task.status(), TaskStatus::Active);
}

#[test]
fn test_record_roundtrip() {
    let now = Utc::now();
    let mut task = sample_task();
    task.record_decision("Use GitHub as provider", now);
    task.record_learning("Device flow needs no client secret", now);
    task.record_deviation("scope_change", "Dropped SAML support", now);
    task.tags.insert("auth".to_string());
    task.version = 3;

    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(task, back);
}
