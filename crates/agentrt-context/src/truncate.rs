// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Emergency truncation: shrink oversized tool-result text to fit a token
//! budget. Dispatches on `OutputCategory` so structurally different output
//! (file contents, match lists, generic blobs) degrades in the way that
//! keeps it most useful to the model.
use agentrt_tools::OutputCategory;

const TRUNCATED_MARKER: &str = "[TRUNCATED]";
const REJECTED_BINARY_STUB: &str = "[BINARY CONTENT REJECTED: exceeds budget and cannot be usefully truncated]";

/// Fraction of characters that must look base64-like before content is
/// treated as binary and replaced wholesale rather than truncated.
const BINARY_LIKE_RATIO_THRESHOLD: f64 = 0.95;

/// Heuristic: does this text look like a base64/binary blob rather than
/// prose or code? Counts the fraction of characters drawn from the base64
/// alphabet (plus a little slack for newlines/padding); text that is almost
/// entirely such characters is very unlikely to be natural text or source
/// code, which always carries punctuation and whitespace in higher
/// proportion.
pub fn looks_binary(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let total = text.chars().count();
    let base64_like = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .count();
    (base64_like as f64 / total as f64) > BINARY_LIKE_RATIO_THRESHOLD
}

/// Truncate `text` to fit within `max_tokens`, returning the result. If the
/// text looks binary, it is replaced with a rejection stub regardless of
/// category (a stub is always small enough to fit). Otherwise dispatches on
/// `category` to decide *where* to cut.
pub fn smart_truncate(text: &str, max_tokens: usize, category: OutputCategory) -> String {
    if looks_binary(text) {
        return REJECTED_BINARY_STUB.to_string();
    }

    let max_chars = max_tokens.saturating_mul(4);
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    match category {
        OutputCategory::HeadTail => head_tail_truncate(text, max_chars),
        OutputCategory::MatchList => match_list_truncate(text, max_chars),
        OutputCategory::FileContent => file_content_truncate(text, max_chars),
        OutputCategory::Generic => generic_truncate(text, max_chars),
    }
}

fn generic_truncate(text: &str, max_chars: usize) -> String {
    let marker_len = TRUNCATED_MARKER.len() + 1;
    let keep = max_chars.saturating_sub(marker_len);
    let truncated: String = text.chars().take(keep).collect();
    format!("{truncated} {TRUNCATED_MARKER}")
}

/// Keep a head and a tail, drop the middle — good for long shell output
/// where both the command's early context and its final status matter.
fn head_tail_truncate(text: &str, max_chars: usize) -> String {
    let marker = format!("\n...{TRUNCATED_MARKER}...\n");
    let budget = max_chars.saturating_sub(marker.len());
    let head_chars = budget / 2;
    let tail_chars = budget - head_chars;

    let chars: Vec<char> = text.chars().collect();
    let head: String = chars.iter().take(head_chars).collect();
    let tail: String = chars.iter().rev().take(tail_chars).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{head}{marker}{tail}")
}

/// Drop whole entries from the tail rather than cutting mid-entry, assuming
/// entries are newline-separated.
fn match_list_truncate(text: &str, max_chars: usize) -> String {
    let mut kept = Vec::new();
    let mut used = 0;
    for line in text.lines() {
        let cost = line.chars().count() + 1;
        if used + cost > max_chars {
            break;
        }
        used += cost;
        kept.push(line);
    }
    let dropped = text.lines().count() - kept.len();
    if dropped == 0 {
        return kept.join("\n");
    }
    format!("{}\n{TRUNCATED_MARKER} ({dropped} more entries omitted)", kept.join("\n"))
}

/// File content: keep whole lines, favoring the head (later context is
/// usually less relevant than seeing how the file begins).
fn file_content_truncate(text: &str, max_chars: usize) -> String {
    let marker = format!("\n{TRUNCATED_MARKER}\n");
    let budget = max_chars.saturating_sub(marker.len());
    let mut kept = Vec::new();
    let mut used = 0;
    for line in text.lines() {
        let cost = line.chars().count() + 1;
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(line);
    }
    format!("{}{marker}", kept.join("\n"))
}
