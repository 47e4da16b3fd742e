//! Issuer detection by keyword scoring.
//!
//! Each known issuer carries a keyword list; the score of an issuer is the
//! summed length of its keywords found in the OCR text (weight 2x) and in
//! the caller's hint (weight 1.5x), normalized by the issuer's total
//! keyword length. Longer, more specific keywords therefore dominate.

use slipguard_core::UNKNOWN_ISSUER;

const TEXT_WEIGHT: f64 = 2.0;
const HINT_WEIGHT: f64 = 1.5;

/// Detection alone never reaches full certainty.
const MAX_ISSUER_CONFIDENCE: f64 = 0.95;

/// Payment issuers we ship keyword knowledge for. Keywords are matched
/// lowercase; order within a list does not matter, table order breaks ties.
pub struct IssuerKeywords {
    pub code: &'static str,
    pub keywords: &'static [&'static str],
}

pub static KNOWN_ISSUERS: &[IssuerKeywords] = &[
    IssuerKeywords { code: "ABA", keywords: &["aba bank", "aba pay", "aba'", "aba"] },
    IssuerKeywords { code: "ACLEDA", keywords: &["acleda bank", "acleda mobile", "acleda"] },
    IssuerKeywords { code: "WING", keywords: &["wing bank", "wing money", "wing"] },
    IssuerKeywords { code: "BAKONG", keywords: &["bakong", "khqr"] },
    IssuerKeywords { code: "TRUEMONEY", keywords: &["truemoney", "true money"] },
    IssuerKeywords { code: "CANADIA", keywords: &["canadia bank", "canadia"] },
    IssuerKeywords { code: "SATHAPANA", keywords: &["sathapana bank", "sathapana"] },
];

/// Detect the payment issuer from OCR text, optionally biased by a hint
/// (e.g. the bank named on the invoice). Deterministic for fixed inputs.
/// Returns `(UNKNOWN, 0.0)` when nothing scores.
pub fn detect_issuer(ocr_text: &str, issuer_hint: Option<&str>) -> (String, f64) {
    let text = ocr_text.to_lowercase();
    let hint = issuer_hint.map(|h| h.to_lowercase());

    let mut best: Option<(&'static str, f64)> = None;
    for issuer in KNOWN_ISSUERS {
        let total_len: usize = issuer.keywords.iter().map(|k| k.len()).sum();
        if total_len == 0 {
            continue;
        }
        let mut score = 0.0;
        for kw in issuer.keywords {
            if text.contains(kw) {
                score += kw.len() as f64 * TEXT_WEIGHT;
            }
            if let Some(h) = &hint {
                if h.contains(kw) {
                    score += kw.len() as f64 * HINT_WEIGHT;
                }
            }
        }
        if score <= 0.0 {
            continue;
        }
        let normalized = score / total_len as f64;
        match best {
            Some((_, current)) if normalized <= current => {}
            _ => best = Some((issuer.code, normalized)),
        }
    }

    match best {
        Some((code, normalized)) => {
            let confidence = (normalized * 2.0).min(MAX_ISSUER_CONFIDENCE);
            (code.to_string(), confidence)
        }
        None => (UNKNOWN_ISSUER.to_string(), 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABA_TEXT: &str =
        "Transfer to JOHN DOE Account 012-345-678 Amount 50,000 KHR ABA Bank";

    #[test]
    fn detects_aba_from_screenshot_text() {
        let (issuer, confidence) = detect_issuer(ABA_TEXT, None);
        assert_eq!(issuer, "ABA");
        assert!(confidence >= 0.5, "confidence {confidence}");
        assert!(confidence <= 0.95);
    }

    #[test]
    fn detection_is_deterministic() {
        let first = detect_issuer(ABA_TEXT, Some("ABA"));
        for _ in 0..10 {
            assert_eq!(detect_issuer(ABA_TEXT, Some("ABA")), first);
        }
    }

    #[test]
    fn hint_breaks_silence() {
        // Text names no issuer; the invoice hint still identifies one.
        let (issuer, confidence) = detect_issuer("Paid 12.50 USD ref 88", Some("Wing Bank"));
        assert_eq!(issuer, "WING");
        assert!(confidence > 0.0);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let (issuer, confidence) = detect_issuer("hello world", None);
        assert_eq!(issuer, "UNKNOWN");
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn confidence_is_capped() {
        let text = "ABA ABA Bank ABA PAY aba' wing bank acleda";
        let (_, confidence) = detect_issuer(text, Some("ABA Bank"));
        assert!(confidence <= 0.95);
    }
}
