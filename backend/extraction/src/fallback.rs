//! Built-in fallback patterns.
//!
//! Used when neither cache nor store knows anything about a detected
//! issuer (including UNKNOWN), so a never-seen issuer degrades to a
//! generic parse instead of failing outright.

use slipguard_core::{ExtractionPattern, FieldType, PatternSource};

const FALLBACK_CONFIDENCE: f64 = 0.5;

/// One conservative pattern per field type, in priority order.
pub fn builtin_fallback_patterns() -> Vec<ExtractionPattern> {
    let specs: [(FieldType, &str); 3] = [
        (
            FieldType::Amount,
            r"(?i:amount|total|paid|received)\s*:?\s*([\d,]+(?:\.\d{1,2})?)",
        ),
        (
            FieldType::AccountNumber,
            r"(?i:account|acc|a/c)\s*(?i:no\.?|number)?\s*:?\s*(\d[\d\-\s]*\d)",
        ),
        (
            FieldType::RecipientName,
            r"(?i:transfer to|paid to|recipient|received by|to)\s*:?\s*([A-Z]{2,}(?:\s+[A-Z]{2,})*)",
        ),
    ];

    specs
        .into_iter()
        .enumerate()
        .map(|(i, (field, regex))| {
            let mut p = ExtractionPattern::new(field, regex, FALLBACK_CONFIDENCE, PatternSource::Fallback);
            p.priority = i as u32;
            p
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_patterns;

    const OCR: &str = "Transfer to JOHN DOE Account 012-345-678 Amount 50,000 KHR ABA Bank";

    #[test]
    fn fallback_extracts_all_three_fields_from_a_typical_slip() {
        let matches = apply_patterns(OCR, &builtin_fallback_patterns());
        assert_eq!(matches[&FieldType::Amount].value, "50,000");
        assert_eq!(matches[&FieldType::AccountNumber].value, "012-345-678");
        assert_eq!(matches[&FieldType::RecipientName].value, "JOHN DOE");
    }

    #[test]
    fn fallback_patterns_survive_normalization() {
        for p in builtin_fallback_patterns() {
            assert!(
                crate::normalize::normalize_pattern(&p.regex).is_some(),
                "builtin pattern failed its own rules: {}",
                p.regex
            );
        }
    }
}
