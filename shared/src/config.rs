//! Configuration types and validation for the task management engine
//!
//! This module defines the configuration structure loaded from `config.toml`
//! under the engine root, including validation logic and the environment
//! overlay applied after file load.

use crate::defaults::*;
use crate::CtmError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the engine root directory.
pub const ENV_ROOT: &str = "CTM_ROOT";
/// Environment variable selecting a working memory profile.
pub const ENV_PROFILE: &str = "CTM_PROFILE";
/// Environment variable toggling the session-start auto-resume suggestion.
pub const ENV_AUTO_RESUME: &str = "CTM_AUTO_RESUME";

/// Name of the configuration file under the engine root.
pub const CONFIG_FILE: &str = "config.toml";

/// Working memory sizing profile.
///
/// A profile is a shorthand for a (capacity, token budget) pair. When
/// `CTM_PROFILE` is set it takes precedence over the file-configured limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryProfile {
    Conservative,
    Balanced,
    Performance,
}

impl MemoryProfile {
    /// Parse a profile name as found in `CTM_PROFILE`.
    pub fn parse(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "conservative" => Ok(MemoryProfile::Conservative),
            "balanced" => Ok(MemoryProfile::Balanced),
            "performance" => Ok(MemoryProfile::Performance),
            other => Err(CtmError::Validation(format!(
                "unknown memory profile '{}' (expected conservative, balanced or performance)",
                other
            ))
            .into()),
        }
    }

    /// The (max hot tasks, token budget) pair this profile stands for.
    pub fn limits(self) -> (usize, u32) {
        match self {
            MemoryProfile::Conservative => (3, 5_000),
            MemoryProfile::Balanced => (5, 8_000),
            MemoryProfile::Performance => (8, 12_000),
        }
    }
}

/// Weights of the priority scoring factors. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriorityWeights {
    #[serde(default = "default_weight_urgency")]
    pub urgency: f64,
    #[serde(default = "default_weight_recency")]
    pub recency: f64,
    #[serde(default = "default_weight_value")]
    pub value: f64,
    #[serde(default = "default_weight_novelty")]
    pub novelty: f64,
    #[serde(default = "default_weight_user_signal")]
    pub user_signal: f64,
    #[serde(default = "default_weight_error_boost")]
    pub error_boost: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            urgency: default_weight_urgency(),
            recency: default_weight_recency(),
            value: default_weight_value(),
            novelty: default_weight_novelty(),
            user_signal: default_weight_user_signal(),
            error_boost: default_weight_error_boost(),
        }
    }
}

impl PriorityWeights {
    /// Check that the weights form a convex combination.
    pub fn validate(&self) -> crate::Result<()> {
        let parts = [
            ("urgency", self.urgency),
            ("recency", self.recency),
            ("value", self.value),
            ("novelty", self.novelty),
            ("user_signal", self.user_signal),
            ("error_boost", self.error_boost),
        ];
        for (name, w) in parts {
            if !(0.0..=1.0).contains(&w) {
                return Err(CtmError::Validation(format!(
                    "priority weight '{}' must be within [0, 1], got {}",
                    name, w
                ))
                .into());
            }
        }
        let sum: f64 = parts.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(CtmError::Validation(format!(
                "priority weights must sum to 1.0, got {:.6}",
                sum
            ))
            .into());
        }
        Ok(())
    }
}

/// Main engine configuration loaded from config.toml.
///
/// Every field carries a serde default so that an absent or partial file
/// yields a fully usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CtmConfig {
    // Working memory limits
    /// Maximum number of tasks held hot at once
    #[serde(default = "default_max_hot_tasks")]
    pub max_hot_tasks: usize,
    /// Token budget shared by all hot tasks
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,

    // Store behavior
    /// Attempts for the optimistic update loop before abandoning
    #[serde(default = "default_update_retry_limit")]
    pub update_retry_limit: u32,
    /// Base backoff between conflicting write attempts in milliseconds
    #[serde(default = "default_update_retry_base_ms")]
    pub update_retry_base_ms: u64,

    // Orchestrator behavior
    /// Hook idempotency lease TTL in seconds
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,
    /// Soft timeout per orchestrator step in seconds
    #[serde(default = "default_step_timeout_seconds")]
    pub step_timeout_seconds: u64,
    /// Window in seconds for considering a task touched by the session
    #[serde(default = "default_session_window_seconds")]
    pub session_window_seconds: i64,
    /// Number of top-ranked tasks admitted to working memory at session start
    #[serde(default = "default_warm_start_tasks")]
    pub warm_start_tasks: usize,
    /// Days a paused task may idle before the briefing flags it as stale
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
    /// Whether session start may suggest resuming a task matching the working directory
    #[serde(default = "default_auto_resume")]
    pub auto_resume: bool,

    // Context and snapshot behavior
    /// Trailing decisions/learnings included in token estimates and snapshots
    #[serde(default = "default_context_tail_len")]
    pub context_tail_len: usize,
    /// Token estimate above which pre-compact compresses a task context
    #[serde(default = "default_compress_threshold_tokens")]
    pub compress_threshold_tokens: u32,
    /// Trailing entries kept per context list after compression
    #[serde(default = "default_compress_keep_tail")]
    pub compress_keep_tail: usize,
    /// Checkpoints retained per task
    #[serde(default = "default_checkpoint_keep")]
    pub checkpoint_keep: usize,

    // Trigger detection
    /// Minimum confidence below which matches are discarded
    #[serde(default = "default_trigger_min_confidence")]
    pub trigger_min_confidence: f64,
    /// Confidence at which the orchestrator emits a suggestion
    #[serde(default = "default_trigger_act_confidence")]
    pub trigger_act_confidence: f64,

    // Extraction
    /// Duplicate-suppression window for consolidated records in days
    #[serde(default = "default_dedup_window_days")]
    pub dedup_window_days: i64,
    /// Tasks extracted concurrently at session end
    #[serde(default = "default_extract_parallelism")]
    pub extract_parallelism: usize,

    /// Scoring factor weights
    #[serde(default)]
    pub priority_weights: PriorityWeights,
}

impl Default for CtmConfig {
    fn default() -> Self {
        // Round-tripping an empty table through serde picks up every field
        // default from defaults.rs without duplicating the values here.
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl CtmConfig {
    /// Load configuration from `<root>/config.toml`, falling back to defaults
    /// when the file is absent, then apply the environment overlay.
    pub fn load(root: &Path) -> crate::Result<Self> {
        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                CtmError::Storage(format!("failed to read {}: {}", path.display(), e))
            })?;
            toml::from_str(&content).map_err(|e| {
                CtmError::Validation(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            tracing::debug!("no config file at {}, using defaults", path.display());
            CtmConfig::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CTM_PROFILE` and `CTM_AUTO_RESUME` on top of the loaded values.
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(name) = std::env::var(ENV_PROFILE) {
            let profile = MemoryProfile::parse(&name)?;
            let (max_hot, budget) = profile.limits();
            self.max_hot_tasks = max_hot;
            self.token_budget = budget;
            tracing::debug!(?profile, max_hot, budget, "applied memory profile from environment");
        }
        if let Ok(flag) = std::env::var(ENV_AUTO_RESUME) {
            self.auto_resume = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// Semantic validation beyond what serde enforces.
    pub fn validate(&self) -> crate::Result<()> {
        self.priority_weights.validate()?;

        if self.max_hot_tasks == 0 {
            return Err(
                CtmError::Validation("max_hot_tasks must be at least 1".to_string()).into(),
            );
        }
        if self.token_budget == 0 {
            return Err(CtmError::Validation("token_budget must be positive".to_string()).into());
        }
        if self.update_retry_limit == 0 {
            return Err(
                CtmError::Validation("update_retry_limit must be at least 1".to_string()).into(),
            );
        }
        if self.warm_start_tasks > self.max_hot_tasks {
            return Err(CtmError::Validation(format!(
                "warm_start_tasks ({}) cannot exceed max_hot_tasks ({})",
                self.warm_start_tasks, self.max_hot_tasks
            ))
            .into());
        }
        for (name, c) in [
            ("trigger_min_confidence", self.trigger_min_confidence),
            ("trigger_act_confidence", self.trigger_act_confidence),
        ] {
            if !(0.0..=1.0).contains(&c) {
                return Err(CtmError::Validation(format!(
                    "{} must be within [0, 1], got {}",
                    name, c
                ))
                .into());
            }
        }
        if self.trigger_min_confidence > self.trigger_act_confidence {
            return Err(CtmError::Validation(
                "trigger_min_confidence cannot exceed trigger_act_confidence".to_string(),
            )
            .into());
        }
        if !(1..=8).contains(&self.extract_parallelism) {
            return Err(CtmError::Validation(format!(
                "extract_parallelism must be within 1..=8, got {}",
                self.extract_parallelism
            ))
            .into());
        }
        if self.session_window_seconds <= 0 {
            return Err(CtmError::Validation(
                "session_window_seconds must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Serialize the effective configuration back to TOML (for `config show`
    /// and for `init` writing the default file).
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Resolve the engine root directory: `CTM_ROOT` if set, else `~/.ctm`.
pub fn resolve_root() -> crate::Result<std::path::PathBuf> {
    if let Ok(root) = std::env::var(ENV_ROOT) {
        if root.trim().is_empty() {
            return Err(CtmError::Validation("CTM_ROOT is set but empty".to_string()).into());
        }
        return Ok(std::path::PathBuf::from(root));
    }
    let home = std::env::var_os("HOME")
        .ok_or_else(|| CtmError::Validation("neither CTM_ROOT nor HOME is set".to_string()))?;
    Ok(std::path::PathBuf::from(home).join(".ctm"))
}
