use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SlipError;

/// Issuer code returned when keyword detection finds nothing.
pub const UNKNOWN_ISSUER: &str = "UNKNOWN";

/// The payment fields we extract from screenshot OCR text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    RecipientName,
    AccountNumber,
    Amount,
}

impl FieldType {
    pub const ALL: [FieldType; 3] = [
        FieldType::RecipientName,
        FieldType::AccountNumber,
        FieldType::Amount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::RecipientName => "recipient_name",
            FieldType::AccountNumber => "account_number",
            FieldType::Amount => "amount",
        }
    }
}

/// Where a pattern came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    /// Built-in conservative pattern, used when nothing has been learned.
    Fallback,
    /// Derived by the pipeline right after a successful fallback verification.
    RealTimeLearning,
    /// Promoted by the batch trainer.
    BatchLearning,
    /// Merchant-specific refinement.
    MerchantLearning,
}

impl PatternSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternSource::Fallback => "fallback",
            PatternSource::RealTimeLearning => "real_time_learning",
            PatternSource::BatchLearning => "batch_learning",
            PatternSource::MerchantLearning => "merchant_learning",
        }
    }
}

/// One learned extraction regex. Immutable once created; a better pattern
/// supersedes it rather than mutating it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPattern {
    pub field_type: FieldType,
    pub regex: String,
    /// Learned confidence in [0, 1].
    pub confidence: f64,
    /// Lower priority is tried first.
    pub priority: u32,
    pub source: PatternSource,
    /// How many learning records exhibited this pattern.
    pub frequency: u32,
    pub success_rate: f64,
    pub sample_size: u32,
    pub learned_at: DateTime<Utc>,
}

impl ExtractionPattern {
    pub fn new(field_type: FieldType, regex: impl Into<String>, confidence: f64, source: PatternSource) -> Self {
        Self {
            field_type,
            regex: regex.into(),
            confidence: confidence.clamp(0.0, 1.0),
            priority: 0,
            source,
            frequency: 1,
            success_rate: 1.0,
            sample_size: 1,
            learned_at: Utc::now(),
        }
    }
}

/// The ordered pattern set currently believed best for one issuer.
/// Owned by the durable template store; caches hold disposable copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerTemplate {
    pub issuer_code: String,
    /// Insertion order is priority order.
    pub patterns: Vec<ExtractionPattern>,
    pub confidence_base: f64,
    pub last_updated: DateTime<Utc>,
    pub update_source: PatternSource,
}

impl IssuerTemplate {
    pub fn new(issuer_code: impl Into<String>, source: PatternSource) -> Self {
        Self {
            issuer_code: issuer_code.into(),
            patterns: Vec::new(),
            confidence_base: 0.5,
            last_updated: Utc::now(),
            update_source: source,
        }
    }

    /// Patterns for one field, in priority order.
    pub fn patterns_for(&self, field: FieldType) -> impl Iterator<Item = &ExtractionPattern> {
        self.patterns.iter().filter(move |p| p.field_type == field)
    }

    pub fn contains_regex(&self, field: FieldType, regex: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.field_type == field && p.regex == regex)
    }

    /// Insert new patterns at the front (highest priority) and re-apply the
    /// per-field cap. The whole list is rebuilt so a reader holding the old
    /// template never sees a half-merged state.
    pub fn prepend_patterns(&mut self, new_patterns: Vec<ExtractionPattern>, max_per_field: usize) {
        let mut merged: Vec<ExtractionPattern> = new_patterns;
        merged.extend(self.patterns.drain(..));

        let mut kept: Vec<ExtractionPattern> = Vec::with_capacity(merged.len());
        let mut counts: HashMap<FieldType, usize> = HashMap::new();
        for p in merged {
            let seen = counts.entry(p.field_type).or_insert(0);
            if *seen >= max_per_field {
                continue;
            }
            if kept.iter().any(|k| k.field_type == p.field_type && k.regex == p.regex) {
                continue;
            }
            *seen += 1;
            kept.push(p);
        }
        for (i, p) in kept.iter_mut().enumerate() {
            p.priority = i as u32;
        }
        self.patterns = kept;
        self.last_updated = Utc::now();
    }
}

/// A merchant-level refinement of an issuer pattern, with usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantPattern {
    pub pattern: ExtractionPattern,
    pub usage_count: u32,
    pub success_rate: f64,
}

impl MerchantPattern {
    pub fn new(pattern: ExtractionPattern) -> Self {
        Self { pattern, usage_count: 0, success_rate: 1.0 }
    }

    /// Exponential counting: recent outcomes weigh more once usage grows.
    pub fn record_use(&mut self, success: bool) {
        self.usage_count = self.usage_count.saturating_add(1);
        let n = self.usage_count.min(20) as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate += (outcome - self.success_rate) / n;
    }
}

/// Merchant overlay for one (tenant, issuer) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantPatternSet {
    pub tenant_id: String,
    pub issuer_code: String,
    pub patterns: Vec<MerchantPattern>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantPatternSet {
    pub fn new(tenant_id: impl Into<String>, issuer_code: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            issuer_code: issuer_code.into(),
            patterns: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Ground-truth or extracted payment fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentFields {
    pub recipient_name: Option<String>,
    pub account_number: Option<String>,
    pub amount: Option<f64>,
}

impl PaymentFields {
    pub fn is_empty(&self) -> bool {
        self.recipient_name.is_none() && self.account_number.is_none() && self.amount.is_none()
    }
}

/// The payment we expect the screenshot to prove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedPayment {
    pub amount: f64,
    pub currency: String,
    /// Acceptable recipient spellings (account holder aliases).
    pub recipient_names: Vec<String>,
    pub to_account: String,
    /// Optional issuer hint from the invoice (e.g. the bank the QR targets).
    pub bank_hint: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Evidence of one successful verification, queued for batch analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: Uuid,
    pub issuer_code: String,
    /// Required. Records without a tenant are rejected at creation so
    /// patterns can never leak across tenants.
    pub tenant_id: String,
    pub merchant_id: Option<String>,
    pub ocr_text: String,
    pub verified_data: PaymentFields,
    /// Candidate regexes observed for this verification, per field.
    pub extracted_patterns: HashMap<FieldType, Vec<String>>,
    pub verification_confidence: f64,
    pub learned_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl LearningRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        issuer_code: impl Into<String>,
        tenant_id: &str,
        merchant_id: Option<String>,
        ocr_text: impl Into<String>,
        verified_data: PaymentFields,
        extracted_patterns: HashMap<FieldType, Vec<String>>,
        verification_confidence: f64,
    ) -> Result<Self, SlipError> {
        let issuer_code = issuer_code.into();
        if tenant_id.trim().is_empty() {
            return Err(SlipError::MissingTenant(issuer_code));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            issuer_code,
            tenant_id: tenant_id.to_string(),
            merchant_id,
            ocr_text: ocr_text.into(),
            verified_data,
            extracted_patterns,
            verification_confidence,
            learned_at: Utc::now(),
            processed: false,
            processed_at: None,
        })
    }
}

/// Final verdict of one verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Rejected,
    /// Nothing contradicted the expectation, but the amount could not be
    /// extracted; needs manual review.
    Pending,
    /// The fallback provider failed; distinguishable from a rejection.
    Error,
}

/// Which path produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    PatternExtraction,
    VisionFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub extracted: PaymentFields,
    pub confidence: f64,
    pub processing_method: ProcessingMethod,
    /// True when the expensive provider was not called.
    pub cost_effective: bool,
    /// Rejection reasons, concatenated rather than prioritized.
    pub reasons: Vec<String>,
}

/// Hint fields forwarded to the vision provider alongside the image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionHints {
    pub expected_amount: Option<f64>,
    pub currency: Option<String>,
    pub invoice_ref: Option<String>,
}

/// What the vision provider returned for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionVerdict {
    pub verified: bool,
    pub fields: PaymentFields,
    pub confidence: f64,
    pub raw_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(field: FieldType, regex: &str) -> ExtractionPattern {
        ExtractionPattern::new(field, regex, 0.9, PatternSource::BatchLearning)
    }

    #[test]
    fn record_without_tenant_is_rejected() {
        let err = LearningRecord::new(
            "ABA",
            "  ",
            None,
            "text",
            PaymentFields::default(),
            HashMap::new(),
            0.9,
        )
        .unwrap_err();
        assert!(matches!(err, SlipError::MissingTenant(_)));
    }

    #[test]
    fn prepend_respects_per_field_cap() {
        let mut tpl = IssuerTemplate::new("ABA", PatternSource::BatchLearning);
        for i in 0..8 {
            tpl.patterns.push(pattern(FieldType::Amount, &format!(r"Amount\s+(\d+{i})")));
        }
        tpl.prepend_patterns(
            vec![pattern(FieldType::Amount, r"Total\s+([\d,]+)")],
            8,
        );
        assert_eq!(tpl.patterns_for(FieldType::Amount).count(), 8);
        assert_eq!(tpl.patterns[0].regex, r"Total\s+([\d,]+)");
        // Oldest pattern fell off the end.
        assert!(!tpl.contains_regex(FieldType::Amount, r"Amount\s+(\d+7)"));
    }

    #[test]
    fn prepend_dedupes_exact_regex() {
        let mut tpl = IssuerTemplate::new("WING", PatternSource::BatchLearning);
        tpl.patterns.push(pattern(FieldType::Amount, r"Amount\s+([\d,]+)"));
        tpl.prepend_patterns(vec![pattern(FieldType::Amount, r"Amount\s+([\d,]+)")], 8);
        assert_eq!(tpl.patterns.len(), 1);
    }

    #[test]
    fn merchant_success_rate_moves_toward_outcomes() {
        let mut mp = MerchantPattern::new(pattern(FieldType::Amount, r"KHR\s+([\d,]+)"));
        mp.record_use(true);
        assert!((mp.success_rate - 1.0).abs() < f64::EPSILON);
        mp.record_use(false);
        assert!(mp.success_rate < 1.0 && mp.success_rate > 0.0);
    }
}
