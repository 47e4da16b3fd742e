//! Batch training processor.
//!
//! One run walks `FetchBatch → GroupByIssuer → ForEachIssuer{Analyze →
//! SelectCandidates → Promote} → MarkProcessed`. An issuer whose analysis
//! fails is reported and its records stay unprocessed; the rest of the
//! batch is unaffected. Re-running on an already-consumed batch is a no-op
//! because consumed records no longer match the fetch filter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use slipguard_cache::{IssuerPatternCache, MerchantPatternCache};
use slipguard_config::TrainingConfig;
use slipguard_core::{
    ExtractionPattern, FieldType, LearningQueue, LearningRecord, MerchantPattern,
    MerchantPatternSet, PatternSource, TemplateStore,
};

/// Outcome of one `process_once` run, per issuer.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub fetched: usize,
    /// Issuer → number of patterns promoted.
    pub promoted: BTreeMap<String, usize>,
    /// Issuers skipped for lack of qualifying samples this round.
    pub skipped: Vec<String>,
    /// Issuer → error message; their records stay unprocessed.
    pub errors: BTreeMap<String, String>,
    pub merchant_updates: usize,
}

impl BatchReport {
    pub fn is_empty_run(&self) -> bool {
        self.fetched == 0
    }
}

struct CandidateStats {
    frequency: u32,
    confidence_sum: f64,
}

pub struct TrainingProcessor {
    store: Arc<dyn TemplateStore>,
    queue: Arc<dyn LearningQueue>,
    issuer_cache: Arc<IssuerPatternCache>,
    merchant_cache: Arc<MerchantPatternCache>,
    cfg: TrainingConfig,
    max_patterns_per_field: usize,
    merchant_max_patterns: usize,
}

impl TrainingProcessor {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        queue: Arc<dyn LearningQueue>,
        issuer_cache: Arc<IssuerPatternCache>,
        merchant_cache: Arc<MerchantPatternCache>,
        cfg: TrainingConfig,
        max_patterns_per_field: usize,
        merchant_max_patterns: usize,
    ) -> Self {
        Self {
            store,
            queue,
            issuer_cache,
            merchant_cache,
            cfg,
            max_patterns_per_field,
            merchant_max_patterns,
        }
    }

    /// Run one batch. Never panics; per-issuer failures land in the report.
    pub async fn process_once(&self) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        let records = self.queue.fetch_unprocessed(self.cfg.batch_size).await?;
        report.fetched = records.len();
        if records.is_empty() {
            debug!("learning queue empty, nothing to train");
            return Ok(report);
        }

        // BTreeMap for a deterministic issuer order.
        let mut by_issuer: BTreeMap<String, Vec<LearningRecord>> = BTreeMap::new();
        for record in records {
            by_issuer.entry(record.issuer_code.clone()).or_default().push(record);
        }

        let mut consumed: Vec<Uuid> = Vec::new();
        for (issuer, group) in &by_issuer {
            match self.process_issuer(issuer, group).await {
                Ok(Some(outcome)) => {
                    report.promoted.insert(issuer.clone(), outcome.promoted);
                    report.merchant_updates += outcome.merchant_updates;
                    consumed.extend(group.iter().map(|r| r.id));
                }
                Ok(None) => {
                    report.skipped.push(issuer.clone());
                }
                Err(e) => {
                    error!(issuer = %issuer, error = %e, "issuer training failed, records kept for retry");
                    report.errors.insert(issuer.clone(), e.to_string());
                }
            }
        }

        self.queue.mark_processed(&consumed).await?;
        info!(
            fetched = report.fetched,
            issuers = report.promoted.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "training batch complete"
        );
        Ok(report)
    }

    /// Delete processed records past the retention window.
    pub async fn run_retention(&self) -> Result<usize> {
        self.queue.purge_processed(self.cfg.retention_days).await
    }

    /// `Ok(None)` means skipped for lack of samples (records not consumed).
    async fn process_issuer(
        &self,
        issuer: &str,
        group: &[LearningRecord],
    ) -> Result<Option<IssuerOutcome>> {
        let qualifying: Vec<&LearningRecord> = group
            .iter()
            .filter(|r| r.verification_confidence >= self.cfg.min_record_confidence)
            .collect();
        if qualifying.len() < self.cfg.min_samples {
            debug!(
                issuer = issuer,
                qualifying = qualifying.len(),
                needed = self.cfg.min_samples,
                "not enough qualifying records this round"
            );
            return Ok(None);
        }

        let selected = self.select_candidates(issuer, &qualifying).await?;
        let promoted = selected.len();
        if promoted > 0 {
            self.promote(issuer, selected).await?;
        }

        let merchant_updates = self.refine_merchants(issuer, &qualifying).await?;
        Ok(Some(IssuerOutcome { promoted, merchant_updates }))
    }

    /// Aggregate and score candidates, then keep the top few new ones.
    async fn select_candidates(
        &self,
        issuer: &str,
        qualifying: &[&LearningRecord],
    ) -> Result<Vec<ExtractionPattern>> {
        let total_records = qualifying.len() as f64;

        let mut stats: HashMap<(FieldType, String), CandidateStats> = HashMap::new();
        for record in qualifying {
            for (field, patterns) in &record.extracted_patterns {
                for regex in patterns {
                    let entry = stats
                        .entry((*field, regex.clone()))
                        .or_insert(CandidateStats { frequency: 0, confidence_sum: 0.0 });
                    entry.frequency += 1;
                    entry.confidence_sum += record.verification_confidence;
                }
            }
        }

        let current = self.store.find(issuer).await?;

        let mut selected: Vec<ExtractionPattern> = Vec::new();
        for field in FieldType::ALL {
            let mut ranked: Vec<(f64, f64, u32, &String)> = stats
                .iter()
                .filter(|((f, _), _)| *f == field)
                .map(|((_, regex), s)| {
                    let avg_confidence = s.confidence_sum / s.frequency as f64;
                    // Records in the queue are successes already.
                    let success_rate = 1.0;
                    let frequency_score = s.frequency as f64 / total_records;
                    let overall = self.cfg.weight_confidence * avg_confidence
                        + self.cfg.weight_success * success_rate
                        + self.cfg.weight_frequency * frequency_score;
                    (overall, avg_confidence, s.frequency, regex)
                })
                .collect();
            ranked.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.3.cmp(b.3))
            });

            let mut taken = 0;
            for (overall, avg_confidence, frequency, regex) in ranked {
                if taken >= self.cfg.max_promotions_per_field {
                    break;
                }
                if overall < self.cfg.min_overall_score || frequency < self.cfg.min_frequency {
                    continue;
                }
                if current
                    .as_ref()
                    .map(|t| t.contains_regex(field, regex))
                    .unwrap_or(false)
                {
                    continue;
                }
                let mut pattern =
                    ExtractionPattern::new(field, regex.clone(), avg_confidence, PatternSource::BatchLearning);
                pattern.frequency = frequency;
                pattern.sample_size = qualifying.len() as u32;
                selected.push(pattern);
                taken += 1;
            }
        }
        Ok(selected)
    }

    /// Persist the winners and refresh the issuer cache so the next
    /// verification sees them immediately.
    async fn promote(&self, issuer: &str, selected: Vec<ExtractionPattern>) -> Result<()> {
        let mut template = self
            .store
            .find(issuer)
            .await?
            .unwrap_or_else(|| slipguard_core::IssuerTemplate::new(issuer, PatternSource::BatchLearning));

        info!(
            issuer = issuer,
            promoted = selected.len(),
            "promoting learned patterns"
        );
        template.prepend_patterns(selected, self.max_patterns_per_field);
        template.update_source = PatternSource::BatchLearning;
        self.store.upsert(&template).await?;
        self.issuer_cache.set(template);
        Ok(())
    }

    /// Merchant-level refinements from the highest-confidence records of
    /// the same batch.
    async fn refine_merchants(
        &self,
        issuer: &str,
        qualifying: &[&LearningRecord],
    ) -> Result<usize> {
        let mut by_tenant: BTreeMap<&str, Vec<&LearningRecord>> = BTreeMap::new();
        for record in qualifying {
            if record.verification_confidence >= self.cfg.merchant_confidence_threshold {
                by_tenant.entry(record.tenant_id.as_str()).or_default().push(record);
            }
        }

        let mut updates = 0;
        for (tenant, records) in by_tenant {
            let mut refinements: Vec<ExtractionPattern> = Vec::new();
            for record in records {
                for (field, patterns) in &record.extracted_patterns {
                    for regex in patterns {
                        if refinements.iter().any(|p| p.regex == *regex) {
                            continue;
                        }
                        refinements.push(ExtractionPattern::new(
                            *field,
                            regex.clone(),
                            record.verification_confidence,
                            PatternSource::MerchantLearning,
                        ));
                    }
                }
            }
            if refinements.is_empty() {
                continue;
            }

            let mut set = self
                .store
                .find_merchant(tenant, issuer)
                .await?
                .unwrap_or_else(|| MerchantPatternSet::new(tenant, issuer));
            let mut merged: Vec<MerchantPattern> =
                refinements.iter().cloned().map(MerchantPattern::new).collect();
            for existing in set.patterns.drain(..) {
                if merged.iter().any(|m| m.pattern.regex == existing.pattern.regex) {
                    continue;
                }
                merged.push(existing);
            }
            merged.truncate(self.merchant_max_patterns);
            set.patterns = merged;
            set.updated_at = Utc::now();

            self.store.upsert_merchant(&set).await?;
            self.merchant_cache.set(set);
            updates += 1;
        }
        Ok(updates)
    }
}

struct IssuerOutcome {
    promoted: usize,
    merchant_updates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use slipguard_core::{IssuerTemplate, PaymentFields};
    use slipguard_store::SqliteStore;

    const WING_ACCOUNT_REGEX: &str = r"Account\s+(\d[\d\-\s]*\d)";

    fn caches() -> (Arc<IssuerPatternCache>, Arc<MerchantPatternCache>) {
        (
            Arc::new(IssuerPatternCache::new(
                Duration::from_secs(3600),
                Duration::from_secs(1800),
                8,
            )),
            Arc::new(MerchantPatternCache::new(
                Duration::from_secs(86_400),
                Duration::from_secs(1800),
                10,
            )),
        )
    }

    fn processor_with(
        store: Arc<dyn TemplateStore>,
        queue: Arc<dyn LearningQueue>,
    ) -> (TrainingProcessor, Arc<IssuerPatternCache>, Arc<MerchantPatternCache>) {
        let (issuer_cache, merchant_cache) = caches();
        let p = TrainingProcessor::new(
            store,
            queue,
            issuer_cache.clone(),
            merchant_cache.clone(),
            TrainingConfig::default(),
            8,
            10,
        );
        (p, issuer_cache, merchant_cache)
    }

    fn record(issuer: &str, tenant: &str, confidence: f64, regex: &str) -> LearningRecord {
        LearningRecord::new(
            issuer,
            tenant,
            None,
            "Transfer Account 012-345-678 Amount 50,000",
            PaymentFields {
                recipient_name: None,
                account_number: Some("012-345-678".into()),
                amount: Some(50_000.0),
            },
            HashMap::from([(FieldType::AccountNumber, vec![regex.to_string()])]),
            confidence,
        )
        .unwrap()
    }

    async fn enqueue_n(queue: &SqliteStore, n: usize, issuer: &str, confidence: f64, regex: &str) {
        for _ in 0..n {
            queue.enqueue(&record(issuer, "tenant-1", confidence, regex)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn recurring_pattern_is_promoted_and_cached() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        enqueue_n(&store, 3, "WING", 0.9, WING_ACCOUNT_REGEX).await;
        let (p, issuer_cache, _) = processor_with(store.clone(), store.clone());

        let report = p.process_once().await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.promoted.get("WING"), Some(&1));

        let template = store.find("WING").await.unwrap().unwrap();
        let promoted = template
            .patterns_for(FieldType::AccountNumber)
            .find(|pat| pat.regex == WING_ACCOUNT_REGEX)
            .expect("promoted pattern in template");
        assert_eq!(promoted.frequency, 3);
        assert!((promoted.confidence - 0.9).abs() < 1e-9);
        assert_eq!(promoted.source, PatternSource::BatchLearning);

        // Cache refreshed in the same run.
        let cached = issuer_cache.get("WING").expect("template cached after promotion");
        assert!(cached.contains_regex(FieldType::AccountNumber, WING_ACCOUNT_REGEX));
    }

    #[tokio::test]
    async fn second_run_on_consumed_batch_is_a_noop() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        enqueue_n(&store, 3, "WING", 0.9, WING_ACCOUNT_REGEX).await;
        let (p, _, _) = processor_with(store.clone(), store.clone());

        let first = p.process_once().await.unwrap();
        assert_eq!(first.promoted.get("WING"), Some(&1));
        let template_after_first = store.find("WING").await.unwrap().unwrap();

        let second = p.process_once().await.unwrap();
        assert!(second.is_empty_run());
        let template_after_second = store.find("WING").await.unwrap().unwrap();
        assert_eq!(
            template_after_first.patterns.len(),
            template_after_second.patterns.len()
        );
    }

    #[tokio::test]
    async fn too_few_samples_skips_the_issuer_and_keeps_records() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        enqueue_n(&store, 2, "WING", 0.9, WING_ACCOUNT_REGEX).await;
        let (p, _, _) = processor_with(store.clone(), store.clone());

        let report = p.process_once().await.unwrap();
        assert!(report.skipped.contains(&"WING".to_string()));
        assert!(store.find("WING").await.unwrap().is_none());
        // Records wait for more evidence.
        assert_eq!(store.depth().await.unwrap(), (2, 0));
    }

    #[tokio::test]
    async fn low_confidence_records_do_not_qualify() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        enqueue_n(&store, 3, "WING", 0.5, WING_ACCOUNT_REGEX).await;
        let (p, _, _) = processor_with(store.clone(), store.clone());

        let report = p.process_once().await.unwrap();
        assert!(report.skipped.contains(&"WING".to_string()));
        assert!(store.find("WING").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn promotion_respects_the_per_field_cap() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut template = IssuerTemplate::new("WING", PatternSource::BatchLearning);
        for i in 0..8 {
            template.patterns.push(ExtractionPattern::new(
                FieldType::AccountNumber,
                format!(r"Acct{i}\s+(\d[\d\-]*\d)"),
                0.8,
                PatternSource::BatchLearning,
            ));
        }
        store.upsert(&template).await.unwrap();
        enqueue_n(&store, 3, "WING", 0.9, WING_ACCOUNT_REGEX).await;
        let (p, _, _) = processor_with(store.clone(), store.clone());

        p.process_once().await.unwrap();
        let updated = store.find("WING").await.unwrap().unwrap();
        assert_eq!(updated.patterns_for(FieldType::AccountNumber).count(), 8);
        // Newest promotion leads, oldest pattern was evicted.
        assert_eq!(updated.patterns[0].regex, WING_ACCOUNT_REGEX);
        assert!(!updated.contains_regex(FieldType::AccountNumber, r"Acct7\s+(\d[\d\-]*\d)"));
    }

    #[tokio::test]
    async fn high_confidence_records_feed_merchant_overlay() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        enqueue_n(&store, 3, "ABA", 0.9, WING_ACCOUNT_REGEX).await;
        let (p, _, merchant_cache) = processor_with(store.clone(), store.clone());

        let report = p.process_once().await.unwrap();
        assert_eq!(report.merchant_updates, 1);
        let set = merchant_cache.get("tenant-1", "ABA").expect("merchant overlay cached");
        assert_eq!(set.patterns.len(), 1);
        assert_eq!(set.patterns[0].pattern.source, PatternSource::MerchantLearning);
        assert!(store.find_merchant("tenant-1", "ABA").await.unwrap().is_some());
    }

    /// Template store that fails upserts for one issuer.
    struct FailingStore {
        inner: Arc<SqliteStore>,
        fail_for: &'static str,
    }

    #[async_trait]
    impl TemplateStore for FailingStore {
        async fn find(&self, issuer_code: &str) -> Result<Option<IssuerTemplate>> {
            self.inner.find(issuer_code).await
        }
        async fn upsert(&self, template: &IssuerTemplate) -> Result<()> {
            if template.issuer_code == self.fail_for {
                anyhow::bail!("disk on fire");
            }
            self.inner.upsert(template).await
        }
        async fn find_merchant(
            &self,
            tenant_id: &str,
            issuer_code: &str,
        ) -> Result<Option<MerchantPatternSet>> {
            self.inner.find_merchant(tenant_id, issuer_code).await
        }
        async fn upsert_merchant(&self, set: &MerchantPatternSet) -> Result<()> {
            self.inner.upsert_merchant(set).await
        }
    }

    #[tokio::test]
    async fn one_issuer_failure_does_not_stop_the_batch() {
        let sqlite = Arc::new(SqliteStore::in_memory().unwrap());
        enqueue_n(&sqlite, 3, "BAD", 0.9, r"Ref\s+(\d[\d\-]*\d)").await;
        enqueue_n(&sqlite, 3, "GOOD", 0.9, WING_ACCOUNT_REGEX).await;
        let failing = Arc::new(FailingStore { inner: sqlite.clone(), fail_for: "BAD" });
        let (p, _, _) = processor_with(failing, sqlite.clone());

        let report = p.process_once().await.unwrap();
        assert!(report.errors.contains_key("BAD"));
        assert_eq!(report.promoted.get("GOOD"), Some(&1));
        // GOOD's records consumed; BAD's retained for the next round.
        assert_eq!(sqlite.depth().await.unwrap(), (3, 3));
    }
}
