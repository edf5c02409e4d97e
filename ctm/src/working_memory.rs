//! Bounded working set of hot tasks
//!
//! Working memory keeps the ids of the most relevant tasks loaded for fast
//! briefings and task switches, bounded both by slot count and by a token
//! budget. It holds ids and bookkeeping only, never task records; callers
//! re-fetch records through the store on access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::task::Task;
use tracing::debug;

// Composite eviction score weights. Recency dominates, then access
// frequency, then priority.
const WEIGHT_RECENCY: f64 = 0.5;
const WEIGHT_ACCESS: f64 = 0.3;
const WEIGHT_PRIORITY: f64 = 0.2;

/// One hot slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotSlot {
    pub task_id: String,
    pub loaded_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub access_count: u32,
    pub token_estimate: u32,
    /// Priority score captured at load/touch time, used as an eviction hint
    #[serde(default)]
    pub priority_score: f64,
}

/// Persisted working memory state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkingMemoryState {
    #[serde(default)]
    pub slots: Vec<HotSlot>,
}

/// Outcome of a load attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    /// Admission refused; the reason is user-facing
    Rejected(String),
}

/// An action taken while relieving pressure.
#[derive(Debug, Clone, PartialEq)]
pub enum PressureAction {
    Evicted { task_id: String, reason: String },
}

/// Working memory engine over a state snapshot.
///
/// The caller owns persistence: load the state from the store, operate, and
/// write the state back.
#[derive(Debug)]
pub struct WorkingMemory {
    state: WorkingMemoryState,
    max_hot: usize,
    token_budget: u32,
    /// Trailing context entries counted by the token estimate
    context_tail: usize,
}

impl WorkingMemory {
    pub fn new(
        state: WorkingMemoryState,
        max_hot: usize,
        token_budget: u32,
        context_tail: usize,
    ) -> Self {
        Self {
            state,
            max_hot,
            token_budget,
            context_tail,
        }
    }

    /// Hand the state back for persistence.
    pub fn into_state(self) -> WorkingMemoryState {
        self.state
    }

    pub fn slots(&self) -> &[HotSlot] {
        &self.state.slots
    }

    #[allow(dead_code)]
    pub fn contains(&self, task_id: &str) -> bool {
        self.state.slots.iter().any(|s| s.task_id == task_id)
    }

    /// Sum of token estimates across all slots.
    pub fn token_total(&self) -> u32 {
        self.state.slots.iter().map(|s| s.token_estimate).sum()
    }

    /// Admit a task to the working set, evicting colder slots if needed.
    ///
    /// Terminal tasks are refused. A task whose estimate alone exceeds the
    /// budget is refused rather than evicting the entire working set for it.
    pub fn load(&mut self, task: &Task, now: DateTime<Utc>) -> (LoadOutcome, Vec<PressureAction>) {
        if task.is_terminal() {
            return (
                LoadOutcome::Rejected(format!("task {} is {}", task.id, task.status())),
                Vec::new(),
            );
        }
        let estimate = task.token_estimate(self.context_tail);
        if estimate > self.token_budget {
            return (
                LoadOutcome::Rejected(format!(
                    "task {} needs {} tokens, budget is {}",
                    task.id, estimate, self.token_budget
                )),
                Vec::new(),
            );
        }

        if let Some(slot) = self
            .state
            .slots
            .iter_mut()
            .find(|s| s.task_id == task.id)
        {
            slot.last_access = now;
            slot.access_count += 1;
            slot.token_estimate = estimate;
            slot.priority_score = task.priority.computed_score;
            let actions = self.manage_pressure();
            return (LoadOutcome::Loaded, actions);
        }

        self.state.slots.push(HotSlot {
            task_id: task.id.clone(),
            loaded_at: now,
            last_access: now,
            access_count: 1,
            token_estimate: estimate,
            priority_score: task.priority.computed_score,
        });
        debug!(id = %task.id, tokens = estimate, "loaded task into working memory");
        let actions = self.manage_pressure();
        (LoadOutcome::Loaded, actions)
    }

    /// Record an access to a hot task.
    #[allow(dead_code)]
    pub fn touch(&mut self, task_id: &str, now: DateTime<Utc>) {
        if let Some(slot) = self.state.slots.iter_mut().find(|s| s.task_id == task_id) {
            slot.last_access = now;
            slot.access_count += 1;
        }
    }

    /// Remove a task from the working set.
    pub fn evict(&mut self, task_id: &str) -> bool {
        let before = self.state.slots.len();
        self.state.slots.retain(|s| s.task_id != task_id);
        before != self.state.slots.len()
    }

    /// Slots ordered by eviction candidacy, coldest first.
    #[allow(dead_code)]
    pub fn snapshot(&self) -> Vec<HotSlot> {
        let mut scored: Vec<(f64, HotSlot)> = self
            .score_slots()
            .into_iter()
            .zip(self.state.slots.iter().cloned())
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.loaded_at.cmp(&b.loaded_at))
        });
        scored.into_iter().map(|(_, slot)| slot).collect()
    }

    /// Evict until both the slot count and the token sum are within limits.
    pub fn manage_pressure(&mut self) -> Vec<PressureAction> {
        let mut actions = Vec::new();
        while self.state.slots.len() > self.max_hot || self.token_total() > self.token_budget {
            let Some(victim) = self.coldest() else {
                break;
            };
            let reason = if self.state.slots.len() > self.max_hot {
                format!("capacity {} exceeded", self.max_hot)
            } else {
                format!("token budget {} exceeded", self.token_budget)
            };
            self.evict(&victim);
            debug!(id = %victim, %reason, "evicted task from working memory");
            actions.push(PressureAction::Evicted {
                task_id: victim,
                reason,
            });
        }
        actions
    }

    /// The slot that should go first: lowest composite score, ties broken by
    /// oldest load time.
    fn coldest(&self) -> Option<String> {
        let scores = self.score_slots();
        self.state
            .slots
            .iter()
            .zip(scores)
            .min_by(|(a, sa), (b, sb)| {
                sa.partial_cmp(sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.loaded_at.cmp(&b.loaded_at))
            })
            .map(|(slot, _)| slot.task_id.clone())
    }

    /// Composite eviction score per slot, higher = hotter. Each factor is
    /// min-max normalized over the current slots; a factor with no spread
    /// contributes equally to every slot.
    fn score_slots(&self) -> Vec<f64> {
        let slots = &self.state.slots;
        if slots.is_empty() {
            return Vec::new();
        }
        let recency: Vec<f64> = slots
            .iter()
            .map(|s| s.last_access.timestamp_millis() as f64)
            .collect();
        let access: Vec<f64> = slots.iter().map(|s| s.access_count as f64).collect();
        let priority: Vec<f64> = slots.iter().map(|s| s.priority_score).collect();

        let recency_n = normalize(&recency);
        let access_n = normalize(&access);
        let priority_n = normalize(&priority);

        (0..slots.len())
            .map(|i| {
                WEIGHT_RECENCY * recency_n[i]
                    + WEIGHT_ACCESS * access_n[i]
                    + WEIGHT_PRIORITY * priority_n[i]
            })
            .collect()
    }
}

fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}
