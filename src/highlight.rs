//! In-note search highlighting.
//!
//! Everything here works on borrowed text and returns new values. Session
//! buffers are never rewritten, so markup cannot reach the note store.

use std::ops::Range;

use regex::{Regex, RegexBuilder};

/// Case-insensitive literal matcher for `query`. `None` for a blank query.
pub fn build_highlight_regex(query: &str) -> Option<Regex> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Byte ranges of every non-overlapping, case-insensitive occurrence of
/// `query` in `text`.
pub fn find_matches(text: &str, query: &str) -> Vec<Range<usize>> {
    match build_highlight_regex(query) {
        Some(regex) => regex.find_iter(text).map(|m| m.range()).collect(),
        None => Vec::new(),
    }
}

/// Display copy of `text` with each match wrapped in `open`/`close`.
pub fn mark_matches(text: &str, query: &str, open: &str, close: &str) -> String {
    let matches = find_matches(text, query);
    if matches.is_empty() {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len() + matches.len() * (open.len() + close.len()));
    let mut last = 0;
    for range in matches {
        out.push_str(&text[last..range.start]);
        out.push_str(open);
        out.push_str(&text[range.clone()]);
        out.push_str(close);
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}
