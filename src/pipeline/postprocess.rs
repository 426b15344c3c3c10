//! Post-processing: normalise model output into a bare HTML fragment.
//!
//! Even when told to output only markup, models regularly wrap the answer in
//! a fenced code block (```` ```html … ``` ````). Stripping is deliberately
//! shallow: two textual checks, no fence matching. A reply that opens a fence
//! and runs out of tokens before closing it still yields its markup.

/// Opening fence with a language tag.
const HTML_FENCE: &str = "```html";
/// Bare fence (opening or closing).
const FENCE: &str = "```";

/// Strip surrounding markdown fences and whitespace from model output.
///
/// 1. Trim surrounding whitespace.
/// 2. Remove a leading ```` ```html ```` or, failing that, ```` ``` ````.
/// 3. Remove a trailing ```` ``` ```` if present.
/// 4. Trim again.
///
/// Text without fences is returned trimmed and otherwise unchanged.
pub fn strip_code_fences(input: &str) -> String {
    let mut s = input.trim();

    if let Some(rest) = s.strip_prefix(HTML_FENCE) {
        s = rest;
    } else if let Some(rest) = s.strip_prefix(FENCE) {
        s = rest;
    }

    if let Some(rest) = s.strip_suffix(FENCE) {
        s = rest;
    }

    s.trim().to_string()
}

/// Remove whitespace-only lines, keeping line order and indentation.
///
/// Applied before a fragment is copied or wrapped into a document.
pub fn strip_blank_lines(input: &str) -> String {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
