//! Tests for utility functions

use crate::utils::{
    calculate_backoff_ms, calculate_string_checksum, fingerprint, generate_task_id,
    normalize_text, significant_tokens, truncate_string, validate_task_id, TASK_ID_LEN,
};

#[test]
fn test_generate_task_id_shape() {
    for _ in 0..50 {
        let id = generate_task_id();
        assert_eq!(id.len(), TASK_ID_LEN);
        assert!(validate_task_id(&id).is_ok());
    }
}

#[test]
fn test_validate_task_id_rejects_bad_input() {
    assert!(validate_task_id("").is_err());
    assert!(validate_task_id("short").is_err());
    assert!(validate_task_id("toolongid").is_err());
    // Uppercase and ambiguous characters are not in the alphabet
    assert!(validate_task_id("ABCDEFGH").is_err());
    assert!(validate_task_id("abc0defg").is_err());
    assert!(validate_task_id("abc1defg").is_err());
}

#[test]
fn test_fingerprint_is_stable() {
    let a = fingerprint("abcdefgh", "Use GitHub as provider");
    let b = fingerprint("abcdefgh", "Use GitHub as provider");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64); // BLAKE3 hex output is 64 characters
}

#[test]
fn test_fingerprint_ignores_formatting() {
    // Case and punctuation differences normalize away
    let a = fingerprint("abcdefgh", "Use GitHub as provider");
    let b = fingerprint("abcdefgh", "use github, as provider!");
    assert_eq!(a, b);

    // Different task ids keep otherwise identical records distinct
    let c = fingerprint("ijkmnpqr", "Use GitHub as provider");
    assert_ne!(a, c);
}

#[test]
fn test_calculate_string_checksum() {
    let one = calculate_string_checksum("content");
    let two = calculate_string_checksum("content");
    let other = calculate_string_checksum("different");
    assert_eq!(one, two);
    assert_ne!(one, other);
}

#[test]
fn test_normalize_text() {
    assert_eq!(normalize_text("  Hello,   World! "), "hello world");
    assert_eq!(normalize_text("We decided: use JSON."), "we decided use json");
    assert_eq!(normalize_text(""), "");
    assert_eq!(normalize_text("---"), "");
}

#[test]
fn test_significant_tokens_drops_stopwords_and_short_words() {
    let tokens = significant_tokens("Switch to the OAuth setup at once");
    assert_eq!(tokens, vec!["switch", "oauth", "setup", "once"]);
}

#[test]
fn test_calculate_backoff_ms() {
    assert_eq!(calculate_backoff_ms(1, 100), 100);
    assert_eq!(calculate_backoff_ms(2, 100), 200);
    assert_eq!(calculate_backoff_ms(3, 100), 300);
    // Saturates instead of overflowing
    assert_eq!(calculate_backoff_ms(u32::MAX, u64::MAX), u64::MAX);
}

#[test]
fn test_truncate_string() {
    assert_eq!(truncate_string("short", 10), "short");
    assert_eq!(truncate_string("exactly ten", 11), "exactly ten");
    assert_eq!(truncate_string("a longer sentence", 10), "a longe...");
    assert_eq!(truncate_string("abcdef", 3), "...");
}
