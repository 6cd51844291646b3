//! Label sanitation
//!
//! Labels become part of file names, so caller-supplied strings are reduced
//! to safe identifiers.

use super::types::ANONYMOUS_LABEL;

/// Turn an arbitrary label into a safe identifier
///
/// Non-identifier characters become `_`, leading digits are stripped, runs of
/// `_` collapse, and surrounding `_` are trimmed. Anything that ends up empty
/// falls back to the anonymous bucket.
pub fn sanitize_label(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let without_digits = replaced.trim_start_matches(|c: char| c.is_ascii_digit());

    let mut collapsed = String::with_capacity(without_digits.len());
    for c in without_digits.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        ANONYMOUS_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitize an optional label hint
pub fn resolve_label(hint: Option<&str>) -> String {
    match hint {
        Some(raw) if !raw.trim().is_empty() => sanitize_label(raw),
        _ => ANONYMOUS_LABEL.to_string(),
    }
}
