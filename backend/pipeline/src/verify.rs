//! Field verification rules.
//!
//! Compares extracted payment fields against the expectation: amount
//! within a percentage tolerance, fuzzy recipient match, account equality
//! after normalization, and an overdue check against the due date. All
//! failing checks are reported together; none outranks another.

use chrono::{DateTime, Utc};

use slipguard_core::{ExpectedPayment, PaymentFields, VerificationStatus};

/// Result of checking extracted fields against an expected payment.
#[derive(Debug, Clone)]
pub struct FieldCheck {
    pub status: VerificationStatus,
    pub reasons: Vec<String>,
}

/// Verify extracted fields against the expectation at a given instant.
///
/// Any mismatch rejects. With no mismatch, a matching amount verifies;
/// a missing amount leaves the outcome pending for manual review.
pub fn verify_fields(
    extracted: &PaymentFields,
    expected: &ExpectedPayment,
    amount_tolerance_pct: f64,
    now: DateTime<Utc>,
) -> FieldCheck {
    let mut reasons = Vec::new();
    let mut amount_matched = false;

    if let Some(amount) = extracted.amount {
        let tolerance = expected.amount.abs() * amount_tolerance_pct / 100.0;
        if (amount - expected.amount).abs() <= tolerance {
            amount_matched = true;
        } else {
            reasons.push(format!(
                "amount_mismatch: extracted {amount} expected {}",
                expected.amount
            ));
        }
    }

    if let Some(name) = &extracted.recipient_name {
        if !expected.recipient_names.is_empty() && !fuzzy_name_match(name, &expected.recipient_names)
        {
            reasons.push(format!("recipient_mismatch: extracted {name}"));
        }
    }

    if let Some(account) = &extracted.account_number {
        if normalize_account(account) != normalize_account(&expected.to_account) {
            reasons.push("account_mismatch".to_string());
        }
    }

    // A late payment fails even with a matching amount.
    if let Some(due) = expected.due_date {
        if now > due {
            reasons.push("overdue".to_string());
        }
    }

    let status = if !reasons.is_empty() {
        VerificationStatus::Rejected
    } else if amount_matched {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Pending
    };

    FieldCheck { status, reasons }
}

/// Digits only; separators and spacing in account numbers vary per issuer.
fn normalize_account(account: &str) -> String {
    account.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// OCR mangles names, so exact equality is too strict. A name matches when
/// its normalized form contains (or is contained by) an expected spelling,
/// or shares at least half of an expected spelling's tokens.
fn fuzzy_name_match(extracted: &str, expected_names: &[String]) -> bool {
    let extracted_norm = normalize_name(extracted);
    if extracted_norm.is_empty() {
        return false;
    }
    for candidate in expected_names {
        let candidate_norm = normalize_name(candidate);
        if candidate_norm.is_empty() {
            continue;
        }
        if extracted_norm.contains(&candidate_norm) || candidate_norm.contains(&extracted_norm) {
            return true;
        }
        let candidate_tokens: Vec<&str> = candidate_norm.split_whitespace().collect();
        let shared = candidate_tokens
            .iter()
            .filter(|t| extracted_norm.split_whitespace().any(|e| e == **t))
            .count();
        if shared * 2 >= candidate_tokens.len() {
            return true;
        }
    }
    false
}

fn normalize_name(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
