//! Stable fingerprints for error occurrences.
//!
//! Two occurrences share a fingerprint when their messages differ only in
//! variable fragments (UUIDs, hex literals, and numbers), their stack traces
//! agree on the leading frames, and they were reported from the same url.

use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of leading stack lines which participate in the fingerprint.
pub const STACK_DEPTH: usize = 10;

lazy_static::lazy_static! {
    static ref UUID_RE: Regex = Regex::new(
        r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
    )
    .expect("Is a valid regex");
    static ref HEX_RE: Regex = Regex::new(r"(?i)0x[0-9a-f]+").expect("Is a valid regex");
    static ref NUMBER_RE: Regex = Regex::new(r"[0-9]+").expect("Is a valid regex");
}

/// Replaces variable fragments of an error message with placeholder tokens.
/// UUIDs are replaced before hex literals, which are replaced before bare numbers.
pub fn normalize_message(message: &str) -> String {
    let message = UUID_RE.replace_all(message, "<uuid>");
    let message = HEX_RE.replace_all(&message, "<hex>");
    let message = NUMBER_RE.replace_all(&message, "<n>");
    message.trim().to_string()
}

/// Keeps at most the first [`STACK_DEPTH`] lines of a stack trace.
pub fn truncate_stack(stack: &str) -> String {
    let lines: Vec<&str> = stack.split('\n').collect();
    if lines.len() <= STACK_DEPTH {
        return stack.to_string();
    }
    lines[..STACK_DEPTH].join("\n")
}

/// Computes the hex-encoded SHA-256 fingerprint of an error occurrence.
/// Absent stacks or urls should be passed as empty strings.
pub fn fingerprint(message: &str, stack: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_message(message).as_bytes());
    hasher.update(truncate_stack(stack).as_bytes());
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
