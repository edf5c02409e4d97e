//! Tests for configuration types and validation

use crate::config::{CtmConfig, MemoryProfile, PriorityWeights, CONFIG_FILE};

#[test]
fn test_default_config_is_valid() {
    let config = CtmConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.max_hot_tasks, 5);
    assert_eq!(config.token_budget, 8_000);
    assert_eq!(config.update_retry_limit, 3);
    assert_eq!(config.lease_ttl_seconds, 300);
    assert_eq!(config.trigger_act_confidence, 0.7);
}

#[test]
fn test_default_weights_sum_to_one() {
    let w = PriorityWeights::default();
    let sum = w.urgency + w.recency + w.value + w.novelty + w.user_signal + w.error_boost;
    assert!((sum - 1.0).abs() < 1e-9);
    assert!(w.validate().is_ok());
}

#[test]
fn test_unbalanced_weights_rejected() {
    let mut w = PriorityWeights::default();
    w.urgency = 0.9;
    assert!(w.validate().is_err());

    let mut w = PriorityWeights::default();
    w.recency = -0.1;
    assert!(w.validate().is_err());
}

#[test]
fn test_profile_limits() {
    assert_eq!(MemoryProfile::Conservative.limits(), (3, 5_000));
    assert_eq!(MemoryProfile::Balanced.limits(), (5, 8_000));
    assert_eq!(MemoryProfile::Performance.limits(), (8, 12_000));
}

#[test]
fn test_profile_parse() {
    assert_eq!(
        MemoryProfile::parse("Conservative").unwrap(),
        MemoryProfile::Conservative
    );
    assert_eq!(
        MemoryProfile::parse("balanced").unwrap(),
        MemoryProfile::Balanced
    );
    assert!(MemoryProfile::parse("turbo").is_err());
}

#[test]
fn test_validate_rejects_zero_capacity() {
    let mut config = CtmConfig::default();
    config.max_hot_tasks = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_warm_start_above_capacity() {
    let mut config = CtmConfig::default();
    config.max_hot_tasks = 3;
    config.warm_start_tasks = 4;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_inverted_confidence_bounds() {
    let mut config = CtmConfig::default();
    config.trigger_min_confidence = 0.8;
    config.trigger_act_confidence = 0.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_bounds_extract_parallelism() {
    let mut config = CtmConfig::default();
    config.extract_parallelism = 0;
    assert!(config.validate().is_err());
    config.extract_parallelism = 9;
    assert!(config.validate().is_err());
    config.extract_parallelism = 4;
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_fills_in_defaults() {
    let config: CtmConfig = toml::from_str(
        r#"
        max_hot_tasks = 3
        token_budget = 2000
        "#,
    )
    .unwrap();
    assert_eq!(config.max_hot_tasks, 3);
    assert_eq!(config.token_budget, 2_000);
    // Everything else falls back to defaults
    assert_eq!(config.update_retry_limit, 3);
    assert_eq!(config.warm_start_tasks, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_missing_file_uses_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = CtmConfig::load(dir.path()).unwrap();
    assert_eq!(config, {
        let mut c = CtmConfig::default();
        c.apply_env().unwrap();
        c
    });
}

#[test]
fn test_load_reads_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), "checkpoint_keep = 7\n").unwrap();
    let config = CtmConfig::load(dir.path()).unwrap();
    assert_eq!(config.checkpoint_keep, 7);
}

#[test]
fn test_load_rejects_malformed_file() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), "max_hot_tasks = \"many\"\n").unwrap();
    assert!(CtmConfig::load(dir.path()).is_err());
}

#[test]
fn test_config_roundtrips_through_toml() {
    let config = CtmConfig::default();
    let rendered = config.to_toml().unwrap();
    let back: CtmConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(config, back);
}
