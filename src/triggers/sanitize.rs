//! Transcript sanitization
//!
//! Transcripts come from a speech recognizer but are still untrusted input:
//! they get a length cap, script-injection fragments stripped, and a
//! character allow-list before the pipeline sees them.

use tracing::{debug, warn};

/// Markers of content that has no business in a voice transcript
const SCRIPT_FRAGMENTS: &[&str] = &[
    "<script",
    "</script>",
    "javascript:",
    "vbscript:",
    "data:text/html",
    "onload=",
    "onerror=",
    "eval(",
    "exec(",
];

fn is_allowed_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '-' | '\'')
}

/// Sanitize a finalized transcript before it enters the pipeline
///
/// Returns `None` when the input is over the length cap or empty after
/// cleaning; such input is dropped silently by the caller.
pub fn sanitize_transcript(text: &str, max_len: usize) -> Option<String> {
    if text.len() > max_len {
        warn!("Dropping over-length transcript: {} > {}", text.len(), max_len);
        return None;
    }

    let mut cleaned = text.to_string();
    for fragment in SCRIPT_FRAGMENTS {
        let lower = cleaned.to_lowercase();
        if lower.contains(fragment) {
            warn!("Stripping suspicious fragment from transcript: {}", fragment);
            cleaned = strip_case_insensitive(&cleaned, fragment);
        }
    }

    let cleaned: String = cleaned.chars().filter(|&c| is_allowed_char(c)).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        debug!("Transcript empty after sanitization");
        return None;
    }
    Some(cleaned.to_string())
}

/// Remove every case-insensitive occurrence of `fragment`, leaving the rest
/// of the text byte-for-byte intact
///
/// Lowercasing can change byte offsets (and even char counts), so each char
/// pushed into the lowered copy remembers the original byte it came from;
/// matches found in the lowered copy are cut from the original by that map.
fn strip_case_insensitive(text: &str, fragment: &str) -> String {
    let mut lowered = String::with_capacity(text.len());
    let mut origins: Vec<(usize, usize)> = Vec::new();
    for (i, c) in text.char_indices() {
        for lc in c.to_lowercase() {
            origins.push((lowered.len(), i));
            lowered.push(lc);
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut keep_from = 0;
    let mut pos = 0;
    while let Some(found) = lowered[pos..].find(fragment) {
        let start = pos + found;
        let end = start + fragment.len();
        // Whole original chars overlapping the match are removed
        let orig_start = origins
            .iter()
            .rev()
            .find(|(l, _)| *l <= start)
            .map(|&(_, o)| o)
            .unwrap_or(0);
        let orig_end = origins
            .iter()
            .find(|(l, _)| *l >= end)
            .map(|&(_, o)| o)
            .unwrap_or(text.len());
        out.push_str(&text[keep_from..orig_start]);
        keep_from = orig_end;
        pos = end;
    }
    out.push_str(&text[keep_from..]);
    out
}
