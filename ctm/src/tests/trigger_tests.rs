//! Tests for trigger detection

use crate::triggers::{TriggerCandidate, TriggerDetector, TriggerKind};

fn candidates() -> Vec<TriggerCandidate> {
    vec![
        TriggerCandidate {
            task_id: "aaaaaaaa".to_string(),
            title: "OAuth setup".to_string(),
            phrases: vec![],
        },
        TriggerCandidate {
            task_id: "bbbbbbbb".to_string(),
            title: "Billing migration".to_string(),
            phrases: vec!["stripe".to_string()],
        },
    ]
}

fn detector() -> TriggerDetector {
    TriggerDetector::new(0.3)
}

#[test]
fn test_empty_utterance_yields_nothing() {
    assert!(detector().detect("", &candidates()).is_empty());
    assert!(detector().detect("   ", &candidates()).is_empty());
}

#[test]
fn test_complete_pattern_with_target() {
    let matches = detector().detect("I'm done with the OAuth setup", &candidates());
    let complete = matches
        .iter()
        .find(|m| m.kind == TriggerKind::Complete)
        .unwrap();
    assert_eq!(complete.target_task_id.as_deref(), Some("aaaaaaaa"));
    assert_eq!(complete.matched_text, "done with");
    assert!(complete.confidence >= 0.7);
}

#[test]
fn test_escalate_patterns_compound() {
    let matches = detector().detect("this is urgent, asap please", &candidates());
    let escalate = matches
        .iter()
        .find(|m| m.kind == TriggerKind::Escalate)
        .unwrap();
    // Two escalation cues together clear the acting threshold
    assert!(escalate.confidence >= 0.7);
}

#[test]
fn test_switch_pattern_resolves_named_task() {
    let matches = detector().detect("let's work on the billing migration next", &candidates());
    let switch = matches
        .iter()
        .find(|m| m.kind == TriggerKind::Switch)
        .unwrap();
    assert_eq!(switch.target_task_id.as_deref(), Some("bbbbbbbb"));
    assert!(switch.confidence >= 0.7);
}

#[test]
fn test_custom_phrase_matches_task() {
    let matches = detector().detect("the stripe webhooks are failing again", &candidates());
    let switch = matches
        .iter()
        .find(|m| m.kind == TriggerKind::Switch && m.target_task_id.as_deref() == Some("bbbbbbbb"))
        .unwrap();
    assert_eq!(switch.matched_text, "stripe");
    assert!(switch.confidence >= 0.7);
}

#[test]
fn test_invalid_custom_pattern_degrades_to_literal() {
    let candidates = vec![TriggerCandidate {
        task_id: "cccccccc".to_string(),
        title: "Parser rewrite".to_string(),
        // Unbalanced paren: not a valid regex
        phrases: vec!["tokenize(".to_string()],
    }];
    let matches = detector().detect("the tokenize( call panics", &candidates);
    assert!(matches
        .iter()
        .any(|m| m.kind == TriggerKind::Switch
            && m.target_task_id.as_deref() == Some("cccccccc")));
}

#[test]
fn test_title_heuristic_is_low_confidence() {
    // No switch phrasing at all, just two title tokens in passing
    let matches = detector().detect("maybe the oauth setup needs another look", &candidates());
    let switch = matches
        .iter()
        .find(|m| m.kind == TriggerKind::Switch && m.target_task_id.as_deref() == Some("aaaaaaaa"))
        .unwrap();
    assert!(switch.confidence >= 0.3);
    assert!(switch.confidence < 0.7);
}

#[test]
fn test_drift_detection() {
    let matches = detector().detect("by the way, the CI cache looks stale", &candidates());
    assert!(matches.iter().any(|m| m.kind == TriggerKind::Drift));
}

#[test]
fn test_park_detection() {
    let matches = detector().detect("put this on hold until the audit lands", &candidates());
    assert!(matches.iter().any(|m| m.kind == TriggerKind::Park));
}

#[test]
fn test_confidence_floor_filters_weak_matches() {
    let strict = TriggerDetector::new(0.9);
    let matches = strict.detect("maybe the oauth setup needs another look", &candidates());
    assert!(matches.is_empty());
}

#[test]
fn test_results_sorted_by_confidence() {
    let matches = detector().detect(
        "done with the oauth setup, let's work on the billing migration",
        &candidates(),
    );
    assert!(matches.len() >= 2);
    for pair in matches.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[test]
fn test_detection_is_pure() {
    let one = detector().detect("switch to the billing migration", &candidates());
    let two = detector().detect("switch to the billing migration", &candidates());
    assert_eq!(one, two);
}

#[test]
fn test_no_match_in_plain_statement() {
    let matches = detector().detect("the weather is nice today", &candidates());
    assert!(matches.is_empty());
}

#[test]
fn test_substring_does_not_match_across_word_boundary() {
    // "urgently" must not fire the "urgent" pattern
    let matches = detector().detect("we should not act urgently here", &candidates());
    assert!(!matches.iter().any(|m| m.kind == TriggerKind::Escalate));
}
