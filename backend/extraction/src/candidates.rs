//! Candidate pattern derivation.
//!
//! After a verification succeeds we know the true field values. Each value
//! is located in the raw OCR text, a bounded context window around it is
//! escaped literally, and the value itself is replaced by a generic capture
//! class for its field. The result is a regex that would have extracted
//! that field from this screenshot and, if the issuer's layout is stable,
//! from the next one.

use std::collections::HashMap;

use slipguard_core::{FieldType, PaymentFields};

use crate::normalize::normalize_pattern;

/// Context kept on each side of the located value, in characters.
const CONTEXT_WINDOW: usize = 30;

/// Derive candidate regexes per field from a verified payment. Duplicates
/// are kept; batch scoring counts them as frequency.
pub fn extract_candidate_patterns(
    ocr_text: &str,
    verified: &PaymentFields,
) -> HashMap<FieldType, Vec<String>> {
    let mut candidates: HashMap<FieldType, Vec<String>> = HashMap::new();

    if let Some(name) = &verified.recipient_name {
        let mut found = derive_for_value(ocr_text, name, FieldType::RecipientName);
        if found.is_empty() && name != &name.to_uppercase() {
            found = derive_for_value(ocr_text, &name.to_uppercase(), FieldType::RecipientName);
        }
        if !found.is_empty() {
            candidates.insert(FieldType::RecipientName, found);
        }
    }

    if let Some(account) = &verified.account_number {
        let found = derive_for_value(ocr_text, account, FieldType::AccountNumber);
        if !found.is_empty() {
            candidates.insert(FieldType::AccountNumber, found);
        }
    }

    if let Some(amount) = verified.amount {
        let mut found = Vec::new();
        for formatted in amount_formats(amount) {
            found.extend(derive_for_value(ocr_text, &formatted, FieldType::Amount));
        }
        if !found.is_empty() {
            candidates.insert(FieldType::Amount, found);
        }
    }

    candidates
}

/// The textual shapes an amount takes in screenshots.
fn amount_formats(amount: f64) -> Vec<String> {
    let mut formats = Vec::new();
    if amount.fract().abs() < f64::EPSILON {
        let raw = format!("{}", amount as i64);
        formats.push(raw.clone());
        let grouped = thousands_separated(&raw);
        if grouped != raw {
            formats.push(grouped);
        }
        formats.push(format!("{raw}.00"));
    } else {
        let two_decimal = format!("{amount:.2}");
        formats.push(two_decimal.clone());
        if let Some((int_part, frac_part)) = two_decimal.split_once('.') {
            let grouped = thousands_separated(int_part);
            if grouped != int_part {
                formats.push(format!("{grouped}.{frac_part}"));
            }
        }
    }
    formats
}

fn thousands_separated(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let chars: Vec<char> = digits.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    out
}

/// Find every occurrence of `value` in the text and turn its surroundings
/// into a candidate pattern. Occurrences sharing identical context produce
/// identical patterns, which is what batch frequency counting wants.
fn derive_for_value(ocr_text: &str, value: &str, field: FieldType) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    let mut patterns = Vec::new();
    let mut offset = 0;
    while let Some(pos) = ocr_text[offset..].find(value) {
        let start = offset + pos;
        let end = start + value.len();

        let prefix = tail_chars(&ocr_text[..start], CONTEXT_WINDOW);
        let suffix = head_chars(&ocr_text[end..], CONTEXT_WINDOW);

        let candidate = format!(
            "{}{}{}",
            regex::escape(prefix),
            capture_class(field),
            regex::escape(suffix)
        );
        if let Some(normalized) = normalize_pattern(&candidate) {
            patterns.push(normalized);
        }
        offset = end;
    }
    patterns
}

/// Generic capture class per field value type.
fn capture_class(field: FieldType) -> &'static str {
    match field {
        FieldType::RecipientName => r"([A-Z][A-Za-z .]+?)",
        FieldType::AccountNumber => r"(\d[\d\-\s]*\d)",
        FieldType::Amount => r"([\d,]+(?:\.\d{1,2})?)",
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    let total = s.chars().count();
    if total <= n {
        return s;
    }
    let skip = total - n;
    let (idx, _) = s.char_indices().nth(skip).unwrap_or((s.len(), ' '));
    &s[idx..]
}

fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    const OCR: &str = "Transfer to JOHN DOE Account 012-345-678 Amount 50,000 KHR ABA Bank";

    fn verified() -> PaymentFields {
        PaymentFields {
            recipient_name: Some("JOHN DOE".to_string()),
            account_number: Some("012-345-678".to_string()),
            amount: Some(50_000.0),
        }
    }

    #[test]
    fn derives_a_candidate_per_field() {
        let candidates = extract_candidate_patterns(OCR, &verified());
        assert!(candidates.contains_key(&FieldType::RecipientName));
        assert!(candidates.contains_key(&FieldType::AccountNumber));
        assert!(candidates.contains_key(&FieldType::Amount));
    }

    #[test]
    fn derived_amount_pattern_reextracts_the_amount() {
        let candidates = extract_candidate_patterns(OCR, &verified());
        let amount_patterns = &candidates[&FieldType::Amount];
        let hit = amount_patterns.iter().any(|p| {
            Regex::new(p)
                .ok()
                .and_then(|re| re.captures(OCR))
                .and_then(|c| c.get(1).map(|m| m.as_str() == "50,000"))
                .unwrap_or(false)
        });
        assert!(hit, "no derived pattern recaptured the amount: {amount_patterns:?}");
    }

    #[test]
    fn derived_account_pattern_reextracts_the_account() {
        let candidates = extract_candidate_patterns(OCR, &verified());
        let account_patterns = &candidates[&FieldType::AccountNumber];
        let hit = account_patterns.iter().any(|p| {
            Regex::new(p)
                .ok()
                .and_then(|re| re.captures(OCR))
                .and_then(|c| c.get(1).map(|m| m.as_str() == "012-345-678"))
                .unwrap_or(false)
        });
        assert!(hit, "{account_patterns:?}");
    }

    #[test]
    fn value_absent_from_text_yields_nothing() {
        let fields = PaymentFields {
            recipient_name: Some("NOBODY HERE".to_string()),
            account_number: None,
            amount: None,
        };
        let candidates = extract_candidate_patterns(OCR, &fields);
        assert!(candidates.is_empty());
    }

    #[test]
    fn amount_formats_cover_the_spec_shapes() {
        let formats = amount_formats(50_000.0);
        assert!(formats.contains(&"50000".to_string()));
        assert!(formats.contains(&"50,000".to_string()));
        assert!(formats.contains(&"50000.00".to_string()));

        let fractional = amount_formats(1_234.5);
        assert!(fractional.contains(&"1234.50".to_string()));
        assert!(fractional.contains(&"1,234.50".to_string()));
    }

    #[test]
    fn identical_layouts_derive_identical_patterns() {
        let a = extract_candidate_patterns(OCR, &verified());
        let b = extract_candidate_patterns(OCR, &verified());
        assert_eq!(a, b);
    }
}
