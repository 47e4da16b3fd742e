//! The verification decision layer.
//!
//! Per request: detect the issuer, resolve the effective pattern set
//! (merchant overlay in front of issuer template, builtin table as the
//! last resort), extract fields, and verify them against the expected
//! payment. When blended confidence falls short the request goes to the
//! expensive vision provider instead, and a successful fallback teaches
//! the cheap layer in real time. Learning records are created strictly
//! after the outcome is decided, so a cancelled request leaves nothing
//! half-written behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use slipguard_cache::{IssuerPatternCache, MerchantPatternCache};
use slipguard_config::PipelineConfig;
use slipguard_core::{
    ExpectedPayment, ExtractionPattern, FieldType, LearningQueue, LearningRecord, PatternSource,
    PaymentFields, ProcessingMethod, TemplateStore, VerificationOutcome, VerificationStatus,
    VisionHints, VisionOcr, VisionVerdict,
};
use slipguard_extraction::{
    apply_patterns, builtin_fallback_patterns, detect_issuer, extract_candidate_patterns,
    FieldMatch,
};
use slipguard_logging::redact_ocr_text;

use crate::cost::{CostReport, CostTracker};
use crate::verify::verify_fields;

/// Patterns learned in real time from a fallback verification never enter
/// the cache below this confidence.
const REAL_TIME_CONFIDENCE_FLOOR: f64 = 0.6;

/// One verification request.
pub struct VerificationRequest {
    pub ocr_text: String,
    /// Raw screenshot bytes; only read when the fallback path fires.
    pub image: Option<Vec<u8>>,
    pub mime_type: String,
    pub tenant_id: String,
    pub merchant_id: Option<String>,
    pub expected: ExpectedPayment,
}

pub struct VerificationPipeline {
    store: Arc<dyn TemplateStore>,
    queue: Arc<dyn LearningQueue>,
    issuer_cache: Arc<IssuerPatternCache>,
    merchant_cache: Arc<MerchantPatternCache>,
    vision: Option<Arc<dyn VisionOcr>>,
    cost: CostTracker,
    cfg: PipelineConfig,
}

impl VerificationPipeline {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        queue: Arc<dyn LearningQueue>,
        issuer_cache: Arc<IssuerPatternCache>,
        merchant_cache: Arc<MerchantPatternCache>,
        vision: Option<Arc<dyn VisionOcr>>,
        cfg: PipelineConfig,
    ) -> Self {
        let cost = CostTracker::new(cfg.provider_cost_usd);
        Self {
            store,
            queue,
            issuer_cache,
            merchant_cache,
            vision,
            cost,
            cfg,
        }
    }

    /// Decide one request. Never returns an `Err`: provider failures and
    /// missing fallback capacity surface as an `Error` outcome.
    pub async fn verify(&self, req: &VerificationRequest) -> VerificationOutcome {
        let (issuer, issuer_confidence) =
            detect_issuer(&req.ocr_text, req.expected.bank_hint.as_deref());
        debug!(issuer = %issuer, confidence = issuer_confidence, "issuer detected");

        let patterns = self.resolve_patterns(&req.tenant_id, &issuer).await;
        let matches = apply_patterns(&req.ocr_text, &patterns);
        let confidence = self.blend_confidence(issuer_confidence, &matches);

        if confidence >= self.cfg.confidence_threshold && !matches.is_empty() {
            return self.decide_cheap(req, &issuer, confidence, matches).await;
        }

        debug!(
            issuer = %issuer,
            confidence,
            matched_fields = matches.len(),
            ocr = %redact_ocr_text(&req.ocr_text),
            "pattern confidence insufficient, using fallback"
        );
        self.fallback(req, &issuer).await
    }

    pub fn cost_report(&self) -> CostReport {
        self.cost.report()
    }

    /// Merchant overlay first, then the issuer template, then the builtin
    /// table. Cache misses repopulate from the durable store.
    async fn resolve_patterns(&self, tenant_id: &str, issuer: &str) -> Vec<ExtractionPattern> {
        let mut patterns: Vec<ExtractionPattern> = Vec::new();

        let overlay = match self.merchant_cache.get(tenant_id, issuer) {
            Some(set) => Some(set),
            None => match self.store.find_merchant(tenant_id, issuer).await {
                Ok(Some(set)) => {
                    self.merchant_cache.set(set.clone());
                    Some(set)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(issuer = %issuer, error = %e, "merchant overlay lookup failed");
                    None
                }
            },
        };
        if let Some(set) = overlay {
            patterns.extend(set.patterns.iter().map(|m| m.pattern.clone()));
        }

        let template = match self.issuer_cache.get(issuer) {
            Some(tpl) => Some(tpl),
            None => match self.store.find(issuer).await {
                Ok(Some(tpl)) => {
                    self.issuer_cache.set(tpl.clone());
                    Some(tpl)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(issuer = %issuer, error = %e, "template store lookup failed");
                    None
                }
            },
        };
        if let Some(tpl) = template {
            patterns.extend(tpl.patterns);
        }

        if patterns.is_empty() {
            debug!(issuer = %issuer, "no learned patterns, degrading to builtin table");
            patterns = builtin_fallback_patterns();
        }
        patterns
    }

    fn blend_confidence(
        &self,
        issuer_confidence: f64,
        matches: &HashMap<FieldType, FieldMatch>,
    ) -> f64 {
        if matches.is_empty() {
            return 0.5 * issuer_confidence;
        }
        let avg = matches.values().map(|m| m.confidence).sum::<f64>() / matches.len() as f64;
        self.cfg.issuer_weight * issuer_confidence + self.cfg.extraction_weight * avg
    }

    async fn decide_cheap(
        &self,
        req: &VerificationRequest,
        issuer: &str,
        confidence: f64,
        matches: HashMap<FieldType, FieldMatch>,
    ) -> VerificationOutcome {
        let extracted = fields_from_matches(&matches);
        let check = verify_fields(
            &extracted,
            &req.expected,
            self.cfg.amount_tolerance_pct,
            Utc::now(),
        );
        let verified = check.status == VerificationStatus::Verified;

        self.record_merchant_usage(req, issuer, &matches, verified);
        self.cost.record_pattern_served();

        if verified {
            let candidates = extract_candidate_patterns(&req.ocr_text, &extracted);
            self.enqueue_learning(issuer, req, &extracted, candidates, confidence)
                .await;
        }

        info!(
            issuer = %issuer,
            status = ?check.status,
            confidence,
            "request decided by pattern extraction"
        );
        VerificationOutcome {
            status: check.status,
            extracted,
            confidence,
            processing_method: ProcessingMethod::PatternExtraction,
            cost_effective: true,
            reasons: check.reasons,
        }
    }

    async fn fallback(&self, req: &VerificationRequest, issuer: &str) -> VerificationOutcome {
        let (vision, image) = match (&self.vision, &req.image) {
            (Some(vision), Some(image)) => (vision, image),
            _ => {
                warn!(issuer = %issuer, "fallback needed but no provider or image available");
                return error_outcome("fallback_unavailable");
            }
        };

        let hints = VisionHints {
            expected_amount: Some(req.expected.amount),
            currency: Some(req.expected.currency.clone()),
            invoice_ref: None,
        };
        self.cost.record_fallback();

        match vision.verify_image(image, &req.mime_type, &hints).await {
            Ok(verdict) => {
                let check = verify_fields(
                    &verdict.fields,
                    &req.expected,
                    self.cfg.amount_tolerance_pct,
                    Utc::now(),
                );
                if check.status == VerificationStatus::Verified {
                    self.learn_from_fallback(req, issuer, &verdict).await;
                }
                info!(
                    issuer = %issuer,
                    status = ?check.status,
                    provider_confidence = verdict.confidence,
                    "request decided by vision fallback"
                );
                VerificationOutcome {
                    status: check.status,
                    extracted: verdict.fields,
                    confidence: verdict.confidence,
                    processing_method: ProcessingMethod::VisionFallback,
                    cost_effective: false,
                    reasons: check.reasons,
                }
            }
            Err(e) => {
                warn!(issuer = %issuer, error = %e, "vision provider failed");
                error_outcome(e.to_string())
            }
        }
    }

    /// A successful fallback teaches the cheap layer immediately: derive
    /// candidates from the provider's fields, push the survivors into the
    /// issuer cache, and queue the evidence for batch consolidation. The
    /// durable template store is written only by the trainer.
    async fn learn_from_fallback(
        &self,
        req: &VerificationRequest,
        issuer: &str,
        verdict: &VisionVerdict,
    ) {
        let text = verdict.raw_text.as_deref().unwrap_or(&req.ocr_text);
        let candidates = extract_candidate_patterns(text, &verdict.fields);

        let confidence = verdict.confidence.max(REAL_TIME_CONFIDENCE_FLOOR);
        let fresh: Vec<ExtractionPattern> = candidates
            .iter()
            .flat_map(|(field, regexes)| {
                regexes.iter().map(|regex| {
                    ExtractionPattern::new(
                        *field,
                        regex.clone(),
                        confidence,
                        PatternSource::RealTimeLearning,
                    )
                })
            })
            .collect();
        if !fresh.is_empty() {
            info!(issuer = %issuer, patterns = fresh.len(), "caching real-time patterns");
            self.issuer_cache
                .update(issuer, fresh, PatternSource::RealTimeLearning);
        }

        self.enqueue_learning(issuer, req, &verdict.fields, candidates, verdict.confidence)
            .await;
    }

    async fn enqueue_learning(
        &self,
        issuer: &str,
        req: &VerificationRequest,
        fields: &PaymentFields,
        candidates: HashMap<FieldType, Vec<String>>,
        confidence: f64,
    ) {
        let record = match LearningRecord::new(
            issuer,
            &req.tenant_id,
            req.merchant_id.clone(),
            req.ocr_text.clone(),
            fields.clone(),
            candidates,
            confidence,
        ) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    issuer = %issuer,
                    security = true,
                    error = %e,
                    "learning record dropped: missing tenant context"
                );
                return;
            }
        };
        if let Err(e) = self.queue.enqueue(&record).await {
            warn!(issuer = %issuer, error = %e, "failed to enqueue learning record");
        }
    }

    /// Feed extraction outcomes back into merchant pattern accounting.
    fn record_merchant_usage(
        &self,
        req: &VerificationRequest,
        issuer: &str,
        matches: &HashMap<FieldType, FieldMatch>,
        verified: bool,
    ) {
        for m in matches.values() {
            if m.source == PatternSource::MerchantLearning {
                self.merchant_cache
                    .record_result(&req.tenant_id, issuer, &m.regex, verified);
            }
        }
    }
}

fn fields_from_matches(matches: &HashMap<FieldType, FieldMatch>) -> PaymentFields {
    PaymentFields {
        recipient_name: matches.get(&FieldType::RecipientName).map(|m| m.value.clone()),
        account_number: matches.get(&FieldType::AccountNumber).map(|m| m.value.clone()),
        amount: matches
            .get(&FieldType::Amount)
            .and_then(|m| parse_amount(&m.value)),
    }
}

/// Screenshot amounts carry thousands separators.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

fn error_outcome(reason: impl Into<String>) -> VerificationOutcome {
    VerificationOutcome {
        status: VerificationStatus::Error,
        extracted: PaymentFields::default(),
        confidence: 0.0,
        processing_method: ProcessingMethod::VisionFallback,
        cost_effective: false,
        reasons: vec![reason.into()],
    }
}
