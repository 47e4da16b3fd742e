//! Config validation: deep checks with all errors reported in one pass.

use std::fmt;

use thiserror::Error;

use crate::schema::SlipGuardConfig;

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errors {
            writeln!(f, "  {e}")?;
        }
        Ok(())
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &SlipGuardConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_cache(config, &mut report);
    validate_training(config, &mut report);
    validate_pipeline(config, &mut report);
    validate_vision(config, &mut report);
    report
}

fn validate_cache(config: &SlipGuardConfig, report: &mut ValidationReport) {
    let c = &config.cache;
    if c.issuer_ttl_secs == 0 {
        report.error("cache.issuer_ttl_secs", "TTL must be greater than zero");
    }
    if c.merchant_ttl_secs == 0 {
        report.error("cache.merchant_ttl_secs", "TTL must be greater than zero");
    }
    if c.max_patterns_per_field == 0 {
        report.error("cache.max_patterns_per_field", "cap must be at least 1");
    }
    if c.merchant_max_patterns == 0 {
        report.error("cache.merchant_max_patterns", "cap must be at least 1");
    }
}

fn validate_training(config: &SlipGuardConfig, report: &mut ValidationReport) {
    let t = &config.training;
    if t.batch_size == 0 {
        report.error("training.batch_size", "batch size must be at least 1");
    }
    if t.interval_secs == 0 {
        report.error("training.interval_secs", "interval must be greater than zero");
    }
    for (path, w) in [
        ("training.weight_confidence", t.weight_confidence),
        ("training.weight_success", t.weight_success),
        ("training.weight_frequency", t.weight_frequency),
        ("training.min_record_confidence", t.min_record_confidence),
        ("training.min_overall_score", t.min_overall_score),
        ("training.merchant_confidence_threshold", t.merchant_confidence_threshold),
    ] {
        if !(0.0..=1.0).contains(&w) {
            report.error(path, format!("{w} is outside [0, 1]"));
        }
    }
    let sum = t.weight_confidence + t.weight_success + t.weight_frequency;
    if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        report.error("training.weight_*", format!("scoring weights sum to {sum}, expected 1.0"));
    }
    if t.retention_days < 1 {
        report.warn("training.retention_days", "retention under one day purges records aggressively");
    }
}

fn validate_pipeline(config: &SlipGuardConfig, report: &mut ValidationReport) {
    let p = &config.pipeline;
    if !(0.0..=1.0).contains(&p.confidence_threshold) {
        report.error("pipeline.confidence_threshold", "threshold must be in [0, 1]");
    }
    let sum = p.issuer_weight + p.extraction_weight;
    if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        report.error("pipeline.*_weight", format!("blend weights sum to {sum}, expected 1.0"));
    }
    if !(0.0..=100.0).contains(&p.amount_tolerance_pct) {
        report.error("pipeline.amount_tolerance_pct", "tolerance must be in [0, 100] percent");
    }
}

fn validate_vision(config: &SlipGuardConfig, report: &mut ValidationReport) {
    if config.vision.endpoint.is_empty() {
        report.warn(
            "vision.endpoint",
            "no vision endpoint configured; low-confidence requests will error instead of falling back",
        );
    } else if config.vision.timeout_secs == 0 {
        report.error("vision.timeout_secs", "timeout must be greater than zero");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&SlipGuardConfig::default()).is_valid());
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let mut config = SlipGuardConfig::default();
        config.training.weight_confidence = 0.9;
        let report = validate(&config);
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.path == "training.weight_*"));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut config = SlipGuardConfig::default();
        config.cache.issuer_ttl_secs = 0;
        assert!(!validate(&config).is_valid());
    }
}
