//! SlipGuard runtime configuration.
//!
//! Provides:
//! - Typed config schema (store, caches, training, pipeline, vision)
//! - YAML loading with `${ENV_VAR}` substitution
//! - Default values for every heuristic constant
//! - Deep validation with all errors reported in one pass

pub mod env;
pub mod schema;
pub mod validation;

pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use schema::{
    CacheConfig, LoggingConfig, PipelineConfig, SlipGuardConfig, StoreConfig, TrainingConfig,
    VisionConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use std::path::Path;

/// Load a config file, substitute env vars, and validate.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_config(path: &Path) -> Result<SlipGuardConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let value: serde_json::Value =
        serde_yaml::from_str(&raw).context("failed to parse config YAML")?;

    let value = resolve_env_vars(&value).context("failed to resolve env vars in config")?;

    let config: SlipGuardConfig =
        serde_json::from_value(value).context("config did not match the expected schema")?;

    let report = validate(&config);
    if !report.is_valid() {
        anyhow::bail!("invalid config:\n{}", report);
    }
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, "{}", warning.message);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = SlipGuardConfig::default();
        assert!(validate(&config).is_valid());
    }

    #[test]
    fn defaults_round_trip_through_yaml() {
        let config = SlipGuardConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: SlipGuardConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.cache.issuer_ttl_secs, config.cache.issuer_ttl_secs);
        assert_eq!(parsed.training.batch_size, config.training.batch_size);
        assert!((parsed.pipeline.confidence_threshold - config.pipeline.confidence_threshold).abs() < 1e-9);
    }
}
