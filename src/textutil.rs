//! UTF-8-safe text previews for log lines and terminal summaries.
//!
//! Prompts and agent output routinely contain multi-byte characters, so
//! previews are cut on character boundaries rather than byte offsets.

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{suffix}")
}

/// Collapse whitespace runs (including newlines) and truncate to one line.
pub fn single_line_preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_suffix_by_chars(&collapsed, max_chars, "...")
}
