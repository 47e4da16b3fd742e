//! SlipGuard configuration schema.
//!
//! Every heuristic constant the verification and training layers rely on
//! (scoring weights, thresholds, TTLs, caps) lives here with its default,
//! so operators can tune without rebuilding.

use serde::{Deserialize, Serialize};

/// Root configuration for the SlipGuard runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlipGuardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for the rolling JSON log file.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), dir: default_log_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (templates + learning queue).
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Issuer template cache TTL.
    #[serde(default = "default_issuer_ttl")]
    pub issuer_ttl_secs: u64,
    /// Merchant overlay cache TTL.
    #[serde(default = "default_merchant_ttl")]
    pub merchant_ttl_secs: u64,
    /// Minimum interval between expired-entry sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_min_interval_secs: u64,
    /// Per-field pattern cap inside one issuer template.
    #[serde(default = "default_max_patterns")]
    pub max_patterns_per_field: usize,
    /// Pattern cap per (tenant, issuer) merchant entry.
    #[serde(default = "default_merchant_max")]
    pub merchant_max_patterns: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            issuer_ttl_secs: default_issuer_ttl(),
            merchant_ttl_secs: default_merchant_ttl(),
            cleanup_min_interval_secs: default_cleanup_interval(),
            max_patterns_per_field: default_max_patterns(),
            merchant_max_patterns: default_merchant_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seconds between scheduled batch runs.
    #[serde(default = "default_training_interval")]
    pub interval_secs: u64,
    /// Max learning records fetched per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Minimum qualifying records before an issuer is analyzed.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Records below this verification confidence do not qualify.
    #[serde(default = "default_min_record_confidence")]
    pub min_record_confidence: f64,
    /// Candidates below this overall score are not promoted.
    #[serde(default = "default_min_overall_score")]
    pub min_overall_score: f64,
    /// Candidates seen fewer times than this are not promoted.
    #[serde(default = "default_min_frequency")]
    pub min_frequency: u32,
    /// Max candidates promoted per field type per batch.
    #[serde(default = "default_max_promotions")]
    pub max_promotions_per_field: usize,
    /// Records at or above this confidence also feed merchant refinements.
    #[serde(default = "default_merchant_threshold")]
    pub merchant_confidence_threshold: f64,
    /// Processed records older than this are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Batch scoring weight on average record confidence.
    #[serde(default = "default_weight_confidence")]
    pub weight_confidence: f64,
    /// Batch scoring weight on success rate.
    #[serde(default = "default_weight_success")]
    pub weight_success: f64,
    /// Batch scoring weight on in-batch frequency.
    #[serde(default = "default_weight_frequency")]
    pub weight_frequency: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_training_interval(),
            batch_size: default_batch_size(),
            min_samples: default_min_samples(),
            min_record_confidence: default_min_record_confidence(),
            min_overall_score: default_min_overall_score(),
            min_frequency: default_min_frequency(),
            max_promotions_per_field: default_max_promotions(),
            merchant_confidence_threshold: default_merchant_threshold(),
            retention_days: default_retention_days(),
            weight_confidence: default_weight_confidence(),
            weight_success: default_weight_success(),
            weight_frequency: default_weight_frequency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum blended confidence to skip the expensive provider.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Weight of issuer-detection confidence in the blend.
    #[serde(default = "default_issuer_weight")]
    pub issuer_weight: f64,
    /// Weight of per-field extraction confidence in the blend.
    #[serde(default = "default_extraction_weight")]
    pub extraction_weight: f64,
    /// Accepted deviation between expected and extracted amount, percent.
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance_pct: f64,
    /// What one provider call costs us; drives the savings telemetry.
    #[serde(default = "default_provider_cost")]
    pub provider_cost_usd: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            issuer_weight: default_issuer_weight(),
            extraction_weight: default_extraction_weight(),
            amount_tolerance_pct: default_amount_tolerance(),
            provider_cost_usd: default_provider_cost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Vision provider endpoint; empty disables the fallback path.
    #[serde(default)]
    pub endpoint: String,
    /// Bearer token; supports `${ENV_VAR}` substitution.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "logs".to_string() }
fn default_db_path() -> String { "slipguard.db".to_string() }
fn default_issuer_ttl() -> u64 { 3_600 }
fn default_merchant_ttl() -> u64 { 86_400 }
fn default_cleanup_interval() -> u64 { 1_800 }
fn default_max_patterns() -> usize { 8 }
fn default_merchant_max() -> usize { 10 }
fn default_training_interval() -> u64 { 300 }
fn default_batch_size() -> usize { 50 }
fn default_min_samples() -> usize { 3 }
fn default_min_record_confidence() -> f64 { 0.80 }
fn default_min_overall_score() -> f64 { 0.75 }
fn default_min_frequency() -> u32 { 2 }
fn default_max_promotions() -> usize { 3 }
fn default_merchant_threshold() -> f64 { 0.85 }
fn default_retention_days() -> i64 { 7 }
fn default_weight_confidence() -> f64 { 0.4 }
fn default_weight_success() -> f64 { 0.4 }
fn default_weight_frequency() -> f64 { 0.2 }
fn default_confidence_threshold() -> f64 { 0.80 }
fn default_issuer_weight() -> f64 { 0.3 }
fn default_extraction_weight() -> f64 { 0.7 }
fn default_amount_tolerance() -> f64 { 5.0 }
fn default_provider_cost() -> f64 { 0.01 }
fn default_vision_timeout() -> u64 { 30 }
