//! Read-only key/value extraction from line-oriented descriptor text.
//!
//! Descriptors hold one logical key per line, written `KEY value` or
//! `KEY:value`. Nothing here is cached: every lookup re-scans the text it is
//! given, so values read after a patch are always current.

use regex::Regex;

use crate::error::Error;
use crate::types::PropertyValue;

/// Find the value of the first occurrence of `key`.
///
/// The value starts right after whichever of `:`, space, or tab comes first on
/// the key's line (searching from the key itself) and runs to the line end,
/// trimmed. A line with no separator yields an empty value. Returns `None` only
/// when `key` does not occur.
pub fn value_of(text: &str, key: &str) -> Option<PropertyValue> {
    if key.is_empty() {
        return None;
    }
    let key_start = text.find(key)?;
    let from_key = text.get(key_start..)?;
    let line_len = from_key.find('\n').unwrap_or(from_key.len());
    let line = from_key.get(..line_len)?;
    let line_end = key_start.checked_add(line_len)?;

    let Some(separator) = line.find([':', ' ', '\t']) else {
        return Some(PropertyValue { span: line_end..line_end, value: String::new() });
    };
    // Separators are single-byte ASCII.
    let raw = line.get(separator.checked_add(1)?..)?;
    let leading = raw.len().checked_sub(raw.trim_start().len())?;
    let value = raw.trim();

    let start = key_start.checked_add(separator)?.checked_add(1)?.checked_add(leading)?;
    let end = start.checked_add(value.len())?;
    return Some(PropertyValue { span: start..end, value: value.to_string() });
}

/// Extract the filename from every line that mentions `marker` (e.g. `.dtx`).
///
/// The marker match is ASCII case-insensitive. The filename is the trimmed rest
/// of the line after the later of the first `:` and the first space that precede
/// the marker, so names containing spaces survive. Lines starting with `;` are
/// comments.
pub fn referenced_file_lines(text: &str, marker: &str) -> Vec<String> {
    let marker_lower = marker.to_ascii_lowercase();
    let mut names = Vec::new();

    for line in text.lines() {
        if line.trim_start().starts_with(';') {
            continue;
        }
        // ASCII lowercasing keeps byte offsets intact.
        let Some(marker_at) = line.to_ascii_lowercase().find(&marker_lower) else {
            continue;
        };
        let Some(before) = line.get(..marker_at) else {
            continue;
        };
        let separator = before.find(':').max(before.find(' '));
        let start = separator.and_then(|i| return i.checked_add(1)).unwrap_or(0);
        let Some(name) = line.get(start..).map(str::trim) else {
            continue;
        };
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }

    return names;
}

/// Collect every distinct key on a line beginning with `prefix`.
///
/// Keys run up to and including their `:`, or up to whitespace when the line
/// is space-separated. Order is first appearance; there is no upper bound on
/// how many keys a family may have.
///
/// # Errors
///
/// Returns `Error::Pattern` if the prefix cannot be turned into a pattern.
pub fn keys_with_prefix(text: &str, prefix: &str) -> Result<Vec<String>, Error> {
    let pattern = Regex::new(&format!(r"(?m)^[ \t]*({}[^\s:]*:?)", regex::escape(prefix)))?;
    let mut keys: Vec<String> = Vec::new();

    for cap in pattern.captures_iter(text) {
        let Some(key) = cap.get(1).map(|m| return m.as_str()) else {
            continue;
        };
        if !keys.iter().any(|k| return k == key) {
            keys.push(key.to_string());
        }
    }

    return Ok(keys);
}
