//! OCR-text redaction.
//!
//! Screenshot OCR text carries account numbers and phone numbers. Any
//! snippet of it that ends up in a log line goes through here first.

use once_cell::sync::Lazy;
use regex::Regex;

/// Four or more digits in a row, optionally split by -, space, or dot.
static DIGIT_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d(?:[\d\-. ]*\d){3,}").unwrap());

/// Mask digit runs (account numbers, phone numbers, amounts) in a snippet
/// of OCR text so logs never carry payment identifiers.
pub fn redact_ocr_text(input: &str) -> String {
    DIGIT_RUN_RE.replace_all(input, "[digits]").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_account_numbers() {
        let clean = redact_ocr_text("Transfer to JOHN DOE Account 012-345-678 Amount 50,000 KHR");
        assert!(!clean.contains("012-345-678"), "{clean}");
        assert!(clean.contains("JOHN DOE"));
    }

    #[test]
    fn no_long_digit_run_survives() {
        let clean = redact_ocr_text("ref 123456789 ok 12 34");
        assert!(!clean.contains("123456789"));
        // Short groups stay readable.
        assert!(clean.contains("ok"));
    }
}
