//! Utility functions for the task management engine
//!
//! Common helpers used across the workspace: id generation, content
//! fingerprinting, text normalization for matching, and retry backoff.

use blake3::Hasher;
use rand::Rng;

/// Length of generated task ids.
pub const TASK_ID_LEN: usize = 8;

/// Alphabet for task ids. Lowercase alphanumerics, with the easily confused
/// characters (0/o, 1/l) left out since ids are typed by hand.
const ID_ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";

/// Generate a fresh 8-character task id.
pub fn generate_task_id() -> String {
    let mut rng = rand::rng();
    (0..TASK_ID_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Check that a string is a well-formed task id.
pub fn validate_task_id(id: &str) -> crate::Result<()> {
    if id.len() != TASK_ID_LEN || !id.bytes().all(|b| ID_ALPHABET.contains(&b)) {
        return Err(crate::CtmError::Validation(format!(
            "'{}' is not a valid task id ({} lowercase alphanumeric characters)",
            id, TASK_ID_LEN
        ))
        .into());
    }
    Ok(())
}

/// Stable fingerprint of an extracted record: blake3 over the task id and the
/// normalized text, hex encoded.
pub fn fingerprint(task_id: &str, text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(task_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalize_text(text).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Calculate BLAKE3 checksum of a string, hex encoded.
pub fn calculate_string_checksum(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Normalize free text for matching: lowercase, punctuation stripped,
/// whitespace collapsed to single spaces.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Words too common to carry signal in title or phrase matching.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "in", "into", "is",
    "it", "of", "on", "or", "our", "that", "the", "this", "to", "up", "we", "with",
];

/// Split normalized text into significant tokens: at least three characters
/// and not a stopword.
pub fn significant_tokens(text: &str) -> Vec<String> {
    normalize_text(text)
        .split(' ')
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Calculate linear backoff delay for optimistic write retries.
/// Attempt numbering starts at 1.
pub fn calculate_backoff_ms(attempt: u32, base_delay_ms: u64) -> u64 {
    base_delay_ms.saturating_mul(attempt as u64)
}

/// Truncate string to maximum length with ellipsis.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let cut: String = s.chars().take(max_len - 3).collect();
        format!("{}...", cut)
    }
}
