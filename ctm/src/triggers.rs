//! Trigger detection over user utterances
//!
//! Classifies an utterance into zero or more trigger matches: switch,
//! complete, escalate, park, or drift, each with an optional target task and
//! a confidence in [0, 1]. The detector is pure and synchronous; it never
//! touches the store. Callers decide the acting threshold.

use regex::RegexBuilder;
use serde::Serialize;
use shared::utils::{normalize_text, significant_tokens};
use std::collections::HashMap;
use tracing::warn;

/// The closed set of trigger types.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Switch,
    Complete,
    Escalate,
    Park,
    Drift,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerKind::Switch => "switch",
            TriggerKind::Complete => "complete",
            TriggerKind::Escalate => "escalate",
            TriggerKind::Park => "park",
            TriggerKind::Drift => "drift",
        };
        write!(f, "{}", name)
    }
}

/// A single detection result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TriggerMatch {
    pub kind: TriggerKind,
    pub target_task_id: Option<String>,
    pub matched_text: String,
    pub confidence: f64,
}

/// What the detector knows about one live task.
#[derive(Debug, Clone)]
pub struct TriggerCandidate {
    pub task_id: String,
    pub title: String,
    pub phrases: Vec<String>,
}

// Static phrase tables. Longer, more anchored phrases score higher through
// the specificity term below.
const COMPLETE_PATTERNS: &[&str] = &[
    "done with",
    "finished",
    "finish this",
    "mark complete",
    "wrap up",
    "that's done",
    "ship it",
];
const ESCALATE_PATTERNS: &[&str] = &[
    "urgent",
    "asap",
    "critical",
    "right away",
    "immediately",
    "drop everything",
    "top priority",
];
const SWITCH_PATTERNS: &[&str] = &[
    "let's work on",
    "switch to",
    "go back to",
    "pick up",
    "resume",
    "work on",
];
const PARK_PATTERNS: &[&str] = &[
    "park this",
    "put this on hold",
    "shelve",
    "not now",
    "save for later",
];
const DRIFT_PATTERNS: &[&str] = &[
    "by the way",
    "tangent",
    "unrelated",
    "side note",
    "off topic",
];

// Confidence model constants.
const SPECIFICITY_BASE: f64 = 0.5;
const SPECIFICITY_PER_CHAR: f64 = 0.02;
const SPECIFICITY_CAP: f64 = 0.35;
const EXACT_PHRASE_BONUS: f64 = 0.15;
const TARGET_RESOLVED_BONUS: f64 = 0.15;
const REPEAT_PATTERN_BONUS: f64 = 0.08;
const REPEAT_PATTERN_BONUS_CAP: f64 = 0.16;
const CUSTOM_PATTERN_BASE: f64 = 0.75;
const TITLE_HEURISTIC_BASE: f64 = 0.35;
const TITLE_HEURISTIC_PER_TOKEN: f64 = 0.1;
const TITLE_HEURISTIC_CAP: f64 = 0.6;

/// Stateless detector; construction fixes the confidence floor.
#[derive(Debug, Clone)]
pub struct TriggerDetector {
    min_confidence: f64,
}

impl TriggerDetector {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Detect triggers in an utterance against the given live tasks.
    /// Returns matches with confidence at or above the floor, best first.
    pub fn detect(&self, utterance: &str, candidates: &[TriggerCandidate]) -> Vec<TriggerMatch> {
        let normalized = normalize_text(utterance);
        if normalized.is_empty() {
            return Vec::new();
        }
        let tokens = significant_tokens(utterance);

        let mut matches: Vec<TriggerMatch> = Vec::new();
        matches.extend(self.static_matches(&normalized, candidates));
        matches.extend(self.custom_matches(utterance, candidates));
        matches.extend(self.title_matches(&tokens, candidates));

        // Keep the best match per (kind, target) pair
        let mut best: HashMap<(TriggerKind, Option<String>), TriggerMatch> = HashMap::new();
        for m in matches {
            let key = (m.kind, m.target_task_id.clone());
            match best.get(&key) {
                Some(existing) if existing.confidence >= m.confidence => {}
                _ => {
                    best.insert(key, m);
                }
            }
        }

        let mut result: Vec<TriggerMatch> = best
            .into_values()
            .filter(|m| m.confidence >= self.min_confidence)
            .collect();
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.matched_text.cmp(&b.matched_text))
        });
        result
    }

    fn static_matches(
        &self,
        normalized: &str,
        candidates: &[TriggerCandidate],
    ) -> Vec<TriggerMatch> {
        let tables: [(TriggerKind, &[&str]); 5] = [
            (TriggerKind::Complete, COMPLETE_PATTERNS),
            (TriggerKind::Escalate, ESCALATE_PATTERNS),
            (TriggerKind::Switch, SWITCH_PATTERNS),
            (TriggerKind::Park, PARK_PATTERNS),
            (TriggerKind::Drift, DRIFT_PATTERNS),
        ];

        let mut out = Vec::new();
        for (kind, patterns) in tables {
            let hits: Vec<&str> = patterns
                .iter()
                .copied()
                .filter(|p| contains_phrase(normalized, p))
                .collect();
            let Some(strongest) = hits
                .iter()
                .max_by_key(|p| p.len())
                .copied()
            else {
                continue;
            };

            let mut confidence = specificity(strongest);
            if normalized == strongest {
                confidence += EXACT_PHRASE_BONUS;
            }
            confidence +=
                (REPEAT_PATTERN_BONUS * (hits.len() - 1) as f64).min(REPEAT_PATTERN_BONUS_CAP);

            // Switch and complete may name a task after the phrase
            let mut target = None;
            if matches!(kind, TriggerKind::Switch | TriggerKind::Complete) {
                target = resolve_target_after(normalized, strongest, candidates);
                if target.is_some() {
                    confidence += TARGET_RESOLVED_BONUS;
                }
            }

            out.push(TriggerMatch {
                kind,
                target_task_id: target,
                matched_text: strongest.to_string(),
                confidence: confidence.min(0.99),
            });
        }
        out
    }

    /// A match against any of a task's declared phrases yields a switch
    /// trigger for that task. Phrases are tried as case-insensitive regexes
    /// and degrade to literal containment when they fail to compile.
    fn custom_matches(&self, utterance: &str, candidates: &[TriggerCandidate]) -> Vec<TriggerMatch> {
        let lowered = utterance.to_lowercase();
        let mut out = Vec::new();
        for candidate in candidates {
            for phrase in &candidate.phrases {
                let hit = match RegexBuilder::new(phrase).case_insensitive(true).build() {
                    Ok(re) => re.is_match(utterance),
                    Err(_) => {
                        warn!(task = %candidate.task_id, phrase = %phrase, "trigger phrase is not a valid pattern, matching literally");
                        lowered.contains(&phrase.to_lowercase())
                    }
                };
                if hit {
                    let confidence = (CUSTOM_PATTERN_BASE
                        + (phrase.len() as f64 * 0.005).min(0.15))
                    .min(0.99);
                    out.push(TriggerMatch {
                        kind: TriggerKind::Switch,
                        target_task_id: Some(candidate.task_id.clone()),
                        matched_text: phrase.clone(),
                        confidence,
                    });
                }
            }
        }
        out
    }

    /// Low-confidence switch when at least two significant tokens of a task
    /// title appear in the utterance.
    fn title_matches(
        &self,
        utterance_tokens: &[String],
        candidates: &[TriggerCandidate],
    ) -> Vec<TriggerMatch> {
        let mut out = Vec::new();
        for candidate in candidates {
            let title_tokens = significant_tokens(&candidate.title);
            if title_tokens.len() < 2 {
                continue;
            }
            let matched: Vec<&String> = title_tokens
                .iter()
                .filter(|t| utterance_tokens.contains(t))
                .collect();
            if matched.len() >= 2 {
                let confidence = (TITLE_HEURISTIC_BASE
                    + TITLE_HEURISTIC_PER_TOKEN * (matched.len() - 2) as f64)
                    .min(TITLE_HEURISTIC_CAP);
                out.push(TriggerMatch {
                    kind: TriggerKind::Switch,
                    target_task_id: Some(candidate.task_id.clone()),
                    matched_text: candidate.title.clone(),
                    confidence,
                });
            }
        }
        out
    }
}

/// Specificity of a static pattern: longer phrases anchor harder.
fn specificity(pattern: &str) -> f64 {
    SPECIFICITY_BASE + (pattern.len() as f64 * SPECIFICITY_PER_CHAR).min(SPECIFICITY_CAP)
}

/// Word-boundary containment over normalized text.
fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = normalize_text(phrase);
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {} ", normalized);
    padded.contains(&format!(" {} ", phrase))
}

/// Resolve the task named by the text following a matched phrase, by token
/// overlap with candidate titles. The best candidate needs at least one
/// shared significant token.
fn resolve_target_after(
    normalized: &str,
    phrase: &str,
    candidates: &[TriggerCandidate],
) -> Option<String> {
    let phrase_norm = normalize_text(phrase);
    let tail = normalized.split(&phrase_norm).nth(1)?.trim();
    if tail.is_empty() {
        return None;
    }
    let tail_tokens = significant_tokens(tail);
    if tail_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(usize, &TriggerCandidate)> = None;
    for candidate in candidates {
        let title_tokens = significant_tokens(&candidate.title);
        let overlap = title_tokens
            .iter()
            .filter(|t| tail_tokens.contains(t))
            .count();
        if overlap >= 1 && best.map(|(n, _)| overlap > n).unwrap_or(true) {
            best = Some((overlap, candidate));
        }
    }
    best.map(|(_, c)| c.task_id.clone())
}
