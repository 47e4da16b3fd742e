//! Candidate pattern normalization.
//!
//! A derived regex only survives if it is long enough to mean something,
//! actually captures a value, compiles, and does not embed a long literal
//! digit run (a symptom of an overly specific, non-generalizing pattern).

use regex::Regex;
use tracing::debug;

const MIN_PATTERN_CHARS: usize = 5;
const MAX_SAME_DIGIT_RUN: usize = 3;

/// Validate and normalize one candidate pattern. Returns `None` when the
/// pattern is rejected.
pub fn normalize_pattern(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim();
    if trimmed.chars().count() < MIN_PATTERN_CHARS {
        return None;
    }
    if !has_capture_group(trimmed) {
        return None;
    }
    if has_long_digit_run(trimmed) {
        return None;
    }
    if let Err(e) = Regex::new(trimmed) {
        debug!(pattern = trimmed, error = %e, "rejecting uncompilable candidate");
        return None;
    }
    Some(trimmed.to_string())
}

/// At least one capturing group: an unescaped `(` not followed by `?`.
fn has_capture_group(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1, // skip escaped char
            '(' => {
                if chars.get(i + 1) != Some(&'?') {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// The same digit appearing more than `MAX_SAME_DIGIT_RUN` times in a row.
fn has_long_digit_run(pattern: &str) -> bool {
    let mut run_char = ' ';
    let mut run_len = 0;
    for c in pattern.chars() {
        if c.is_ascii_digit() && c == run_char {
            run_len += 1;
            if run_len > MAX_SAME_DIGIT_RUN {
                return true;
            }
        } else if c.is_ascii_digit() {
            run_char = c;
            run_len = 1;
        } else {
            run_char = ' ';
            run_len = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_sane_pattern() {
        let p = normalize_pattern(r"Amount\s+([\d,]+)").unwrap();
        assert_eq!(p, r"Amount\s+([\d,]+)");
    }

    #[test]
    fn rejects_short_patterns() {
        assert!(normalize_pattern(r"(\d)").is_none());
    }

    #[test]
    fn rejects_patterns_without_capture_group() {
        assert!(normalize_pattern(r"Amount\s+\d+").is_none());
        // A non-capturing group alone does not count.
        assert!(normalize_pattern(r"(?:Amount)\s+\d+").is_none());
    }

    #[test]
    fn escaped_paren_is_not_a_group() {
        assert!(normalize_pattern(r"Amount \(KHR\) \d+").is_none());
    }

    #[test]
    fn rejects_long_literal_digit_runs() {
        assert!(normalize_pattern(r"ref 11111 ([\d,]+)").is_none());
        // Three in a row is still fine.
        assert!(normalize_pattern(r"ref 111 ([\d,]+)").is_some());
    }

    #[test]
    fn rejects_uncompilable_regex() {
        assert!(normalize_pattern(r"Amount ([\d,+").is_none());
    }

    #[test]
    fn survivors_always_have_a_capture_and_length() {
        // The validity property: anything that comes back satisfies both rules.
        for raw in [r"(\d)", r"To\s+([A-Z ]+)", "abc", r"((?:\d+))"] {
            if let Some(p) = normalize_pattern(raw) {
                assert!(p.chars().count() >= 5);
                assert!(has_capture_group(&p));
            }
        }
    }
}
