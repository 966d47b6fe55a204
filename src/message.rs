//! The `KEY=value` set-command message.
//!
//! One assignment per line, lines joined with `\n`, no trailing newline and
//! no quoting. Hashpipe splits each line on its first `=`.

use tracing::warn;

use crate::value::Value;

/// Build the message published (or logged) for a set of assignments.
pub fn encode_set_message(assignments: &[(&str, Value)]) -> String {
    assignments
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a set-command message back into raw `(key, value)` pairs.
///
/// Blank lines are skipped. Lines without `=` are dropped with a warning.
pub fn parse_set_message(message: &str) -> Vec<(String, String)> {
    message
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.split_once('=') {
            Some((key, value)) => Some((key.to_string(), value.to_string())),
            None => {
                warn!(line, "ignoring set-command line without '='");
                None
            }
        })
        .collect()
}
