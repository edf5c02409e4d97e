//! Default values for configuration parameters
//!
//! This module centralizes all default value functions used by the configuration
//! structures. These functions are used by serde when deserializing configuration
//! files that don't specify certain optional fields.

// Working memory defaults

/// Default maximum number of tasks held hot in working memory
pub fn default_max_hot_tasks() -> usize {
    5
}

/// Default working memory token budget
pub fn default_token_budget() -> u32 {
    8_000
}

// Priority weight defaults (must sum to 1.0)

/// Weight of the deadline-proximity factor
pub fn default_weight_urgency() -> f64 {
    0.25
}

/// Weight of the last-active recency factor
pub fn default_weight_recency() -> f64 {
    0.20
}

/// Weight of the configured task value
pub fn default_weight_value() -> f64 {
    0.20
}

/// Weight of the task-age novelty factor
pub fn default_weight_novelty() -> f64 {
    0.15
}

/// Weight of the explicit user signal
pub fn default_weight_user_signal() -> f64 {
    0.15
}

/// Weight of the recent-error boost
pub fn default_weight_error_boost() -> f64 {
    0.05
}

// Store defaults

/// Default number of attempts for the optimistic update loop
pub fn default_update_retry_limit() -> u32 {
    3
}

/// Default base backoff between conflicting write attempts (milliseconds)
pub fn default_update_retry_base_ms() -> u64 {
    100
}

// Orchestrator defaults

/// Default hook idempotency lease TTL (5 minutes)
pub fn default_lease_ttl_seconds() -> u64 {
    300
}

/// Default soft timeout for a single orchestrator step (5 seconds)
pub fn default_step_timeout_seconds() -> u64 {
    5
}

/// Default window for considering a task "touched this session" (1 hour)
pub fn default_session_window_seconds() -> i64 {
    3_600
}

/// Default number of top-of-queue tasks admitted to working memory at session start
pub fn default_warm_start_tasks() -> usize {
    3
}

/// Default number of days a paused task may idle before the briefing flags it
pub fn default_stale_after_days() -> i64 {
    7
}

/// Default auto-resume behavior at session start
pub fn default_auto_resume() -> bool {
    true
}

// Context and snapshot defaults

/// Default number of trailing decisions/learnings included in estimates and snapshots
pub fn default_context_tail_len() -> usize {
    5
}

/// Default token estimate above which a task context is compressed at pre-compact
pub fn default_compress_threshold_tokens() -> u32 {
    4_000
}

/// Default number of trailing entries kept per context list after compression
pub fn default_compress_keep_tail() -> usize {
    20
}

/// Default number of checkpoints retained per task
pub fn default_checkpoint_keep() -> usize {
    20
}

// Trigger defaults

/// Default minimum confidence below which trigger matches are discarded
pub fn default_trigger_min_confidence() -> f64 {
    0.3
}

/// Default confidence at which the orchestrator acts on a trigger match
pub fn default_trigger_act_confidence() -> f64 {
    0.7
}

// Extractor defaults

/// Default duplicate-suppression window for consolidated records (30 days)
pub fn default_dedup_window_days() -> i64 {
    30
}

/// Default number of tasks extracted concurrently at session end
pub fn default_extract_parallelism() -> usize {
    1
}
