use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SlipError;
use crate::types::{
    IssuerTemplate, LearningRecord, MerchantPatternSet, VisionHints, VisionVerdict,
};

/// Durable template store, the source of truth the caches project from.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Look up the template for an issuer.
    async fn find(&self, issuer_code: &str) -> Result<Option<IssuerTemplate>>;

    /// Insert or replace an issuer template.
    async fn upsert(&self, template: &IssuerTemplate) -> Result<()>;

    /// Look up the merchant overlay for a (tenant, issuer) pair.
    async fn find_merchant(
        &self,
        tenant_id: &str,
        issuer_code: &str,
    ) -> Result<Option<MerchantPatternSet>>;

    /// Insert or replace a merchant overlay.
    async fn upsert_merchant(&self, set: &MerchantPatternSet) -> Result<()>;
}

/// Durable queue of learning records, produced by the pipeline and
/// consumed by the batch trainer.
#[async_trait]
pub trait LearningQueue: Send + Sync {
    async fn enqueue(&self, record: &LearningRecord) -> Result<()>;

    /// Up to `limit` records with `processed = false`, oldest first.
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<LearningRecord>>;

    /// Flag consumed records; idempotent.
    async fn mark_processed(&self, ids: &[Uuid]) -> Result<()>;

    /// Delete processed records older than the retention window.
    /// Returns the number deleted.
    async fn purge_processed(&self, older_than_days: i64) -> Result<usize>;

    /// Queue depth split into (unprocessed, processed).
    async fn depth(&self) -> Result<(usize, usize)>;
}

/// The expensive external vision OCR provider, consumed as a black box.
#[async_trait]
pub trait VisionOcr: Send + Sync {
    /// Submit an image plus hints; the provider extracts fields and renders
    /// its own verdict. Errors carry enough detail to surface an `Error`
    /// outcome distinct from a rejection.
    async fn verify_image(
        &self,
        image: &[u8],
        mime_type: &str,
        hints: &VisionHints,
    ) -> Result<VisionVerdict, SlipError>;
}
