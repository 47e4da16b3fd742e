//! Runtime wiring shared by the CLI commands.
//!
//! Builds the long-lived pieces once from config and hands them out by
//! `Arc`: one store, two caches, one pipeline, and optionally the training
//! scheduler on top.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::warn;

use slipguard_cache::{IssuerPatternCache, MerchantPatternCache};
use slipguard_config::SlipGuardConfig;
use slipguard_core::VisionOcr;
use slipguard_pipeline::VerificationPipeline;
use slipguard_store::SqliteStore;
use slipguard_training::{SchedulerHandle, TrainingProcessor, TrainingScheduler};
use slipguard_vision::HttpVisionOcr;

pub struct Runtime {
    pub store: Arc<SqliteStore>,
    pub issuer_cache: Arc<IssuerPatternCache>,
    pub merchant_cache: Arc<MerchantPatternCache>,
    pub pipeline: Arc<VerificationPipeline>,
}

pub fn build(config: &SlipGuardConfig) -> Result<Runtime> {
    let store = Arc::new(SqliteStore::open(&config.store.db_path)?);

    let cleanup = Duration::from_secs(config.cache.cleanup_min_interval_secs);
    let issuer_cache = Arc::new(IssuerPatternCache::new(
        Duration::from_secs(config.cache.issuer_ttl_secs),
        cleanup,
        config.cache.max_patterns_per_field,
    ));
    let merchant_cache = Arc::new(MerchantPatternCache::new(
        Duration::from_secs(config.cache.merchant_ttl_secs),
        cleanup,
        config.cache.merchant_max_patterns,
    ));

    let vision: Option<Arc<dyn VisionOcr>> = if config.vision.endpoint.is_empty() {
        warn!("vision.endpoint not configured; low-confidence requests will return an error");
        None
    } else {
        Some(Arc::new(HttpVisionOcr::from_config(&config.vision)?))
    };

    let pipeline = Arc::new(VerificationPipeline::new(
        store.clone(),
        store.clone(),
        issuer_cache.clone(),
        merchant_cache.clone(),
        vision,
        config.pipeline.clone(),
    ));

    Ok(Runtime { store, issuer_cache, merchant_cache, pipeline })
}

impl Runtime {
    pub fn start_scheduler(
        &self,
        config: &SlipGuardConfig,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let processor = Arc::new(TrainingProcessor::new(
            self.store.clone(),
            self.store.clone(),
            self.issuer_cache.clone(),
            self.merchant_cache.clone(),
            config.training.clone(),
            config.cache.max_patterns_per_field,
            config.cache.merchant_max_patterns,
        ));
        TrainingScheduler::new(
            processor,
            self.issuer_cache.clone(),
            self.merchant_cache.clone(),
            config.training.interval_secs,
        )
        .start()
    }
}
