//! Error-context policy: which output is handed to the suggestion step.

use crate::core::types::CommandResult;

/// Build the error context for a failed result, keeping at most `limit_bytes`
/// of the tail (the end of a log is where the failure usually is).
pub fn error_context(result: &CommandResult, limit_bytes: usize) -> String {
    tail_bytes(result.preferred_output(), limit_bytes)
}

/// Keep the last `limit` bytes of `text`, cut on a char boundary, with a notice
/// of how much was dropped.
pub fn tail_bytes(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated {} bytes]\n{}", start, &text[start..])
}
