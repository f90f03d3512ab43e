// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort structured-payload extraction from free-form agent text.
//!
//! The agent is asked for a fenced JSON block but frequently prefixes it
//! with prose, fences it inconsistently, or skips fencing entirely. An
//! ordered strategy chain recovers the payload: each strategy is a pure
//! `text -> Option<Value>` function and the first success wins. Early
//! strategies avoid false positives from JSON-like fragments in prose;
//! the last resort trades precision for recoverability. A candidate must
//! both look plausible (balanced, correct outer delimiters) and parse.

use serde_json::Value;

/// Extract the structured payload embedded in `text`, if any.
///
/// Returns `None` when no strategy yields a parseable object or array —
/// a soft failure the caller reports, never a panic.
pub fn extract_payload(text: &str) -> Option<Value> {
    labeled_fenced_block(text)
        .or_else(|| any_fenced_block(text))
        .or_else(|| balanced_from_first(text))
        .or_else(|| balanced_after_marker(text))
        .or_else(|| best_balanced_anywhere(text))
}

/// Strategy 1: a fenced block explicitly labeled `json`.
fn labeled_fenced_block(text: &str) -> Option<Value> {
    fenced_blocks(text)
        .into_iter()
        .filter(|(header, _)| header.eq_ignore_ascii_case("json"))
        .find_map(|(_, body)| parse_candidate(body))
}

/// Strategy 2: any fenced block whose content has payload-shaped outer
/// delimiters.
fn any_fenced_block(text: &str) -> Option<Value> {
    fenced_blocks(text)
        .into_iter()
        .find_map(|(_, body)| parse_candidate(body))
}

/// Strategy 3: balanced scan from the first opening delimiter.
fn balanced_from_first(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    parse_candidate(balanced_slice(text, start)?)
}

/// Strategy 4: balanced scan anchored after a "here is the result" style
/// marker, to skip JSON-like fragments in leading prose.
fn balanced_after_marker(text: &str) -> Option<Value> {
    const MARKERS: &[&str] = &[
        "here is",
        "here are",
        "result:",
        "results:",
        "output:",
        "final answer",
    ];
    let haystack = text.to_ascii_lowercase();
    MARKERS.iter().find_map(|marker| {
        let anchor = haystack.find(marker)? + marker.len();
        let rest = &text[anchor..];
        let start = anchor + rest.find(['{', '['])?;
        parse_candidate(balanced_slice(text, start)?)
    })
}

/// Strategy 5 (last resort): every balanced substring in the text;
/// accept the longest parsed array, else the first parsed object.
fn best_balanced_anywhere(text: &str) -> Option<Value> {
    let mut best_array: Option<(usize, Value)> = None;
    let mut first_object: Option<Value> = None;

    for (index, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let Some(slice) = balanced_slice(text, index) else {
            continue;
        };
        let Some(value) = parse_candidate(slice) else {
            continue;
        };
        if value.is_array() {
            if best_array.as_ref().map(|(len, _)| slice.len() > *len).unwrap_or(true) {
                best_array = Some((slice.len(), value));
            }
        } else if first_object.is_none() {
            first_object = Some(value);
        }
    }

    best_array.map(|(_, v)| v).or(first_object)
}

/// All ``` fenced blocks as `(header, trimmed body)` pairs.
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    while let Some(open_rel) = text[cursor..].find("```") {
        let open = cursor + open_rel;
        let after = &text[open + 3..];
        let header_end = after.find('\n').unwrap_or(after.len());
        let header = after[..header_end].trim();
        let body_start = open + 3 + header_end + 1;
        if body_start >= text.len() {
            break;
        }
        let Some(close_rel) = text[body_start..].find("```") else {
            break;
        };
        let close = body_start + close_rel;
        blocks.push((header, text[body_start..close].trim()));
        cursor = close + 3;
    }
    blocks
}

/// Slice from the opening delimiter at `start` through its balanced
/// closer. Tracks string-literal and escape state so delimiters inside
/// string values are not miscounted.
fn balanced_slice(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    match bytes.get(start) {
        Some(b'{') | Some(b'[') => {}
        _ => return None,
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A candidate passes only when it is payload-shaped AND parses.
fn parse_candidate(candidate: &str) -> Option<Value> {
    let trimmed = candidate.trim();
    let payload_shaped = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !payload_shaped {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(|value| value.is_object() || value.is_array())
}

/// Aggregate test counts recovered from a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl TestCounts {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

/// Recover test counts from the common payload shapes: an object with
/// count fields (possibly nested under `tests`/`summary`/`results`), or
/// an array of per-test results.
pub fn test_counts(value: &Value) -> Option<TestCounts> {
    match value {
        Value::Object(obj) => {
            let field = |names: &[&str]| {
                names
                    .iter()
                    .find_map(|name| obj.get(*name))
                    .and_then(Value::as_u64)
                    .map(|v| v as u32)
            };
            let passed = field(&["passed", "pass", "passing"]);
            let failed = field(&["failed", "fail", "failing"]);
            if passed.is_none() && failed.is_none() {
                return ["tests", "summary", "results"]
                    .iter()
                    .find_map(|key| obj.get(*key))
                    .and_then(test_counts);
            }
            let passed = passed.unwrap_or(0);
            let failed = failed.unwrap_or(0);
            let skipped = field(&["skipped", "skip"]).unwrap_or(0);
            let total = field(&["total"]).unwrap_or(passed + failed + skipped);
            Some(TestCounts {
                total,
                passed,
                failed,
                skipped,
            })
        }
        Value::Array(items) if !items.is_empty() => {
            let mut counts = TestCounts {
                total: items.len() as u32,
                passed: 0,
                failed: 0,
                skipped: 0,
            };
            for item in items {
                match item_verdict(item) {
                    Some(Verdict::Passed) => counts.passed += 1,
                    Some(Verdict::Failed) => counts.failed += 1,
                    Some(Verdict::Skipped) => counts.skipped += 1,
                    None => {}
                }
            }
            (counts.passed + counts.failed + counts.skipped > 0).then_some(counts)
        }
        _ => None,
    }
}

enum Verdict {
    Passed,
    Failed,
    Skipped,
}

fn item_verdict(item: &Value) -> Option<Verdict> {
    if let Some(flag) = item.get("passed").and_then(Value::as_bool) {
        return Some(if flag { Verdict::Passed } else { Verdict::Failed });
    }
    let status = item
        .get("status")
        .or_else(|| item.get("result"))
        .and_then(Value::as_str)?;
    match status.to_ascii_lowercase().as_str() {
        "passed" | "pass" | "green" | "ok" => Some(Verdict::Passed),
        "failed" | "fail" | "error" | "red" => Some(Verdict::Failed),
        "skipped" | "skip" | "pending" => Some(Verdict::Skipped),
        _ => None,
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
