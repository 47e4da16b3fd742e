//! Issuer-level template cache.

use std::time::Duration;

use tracing::debug;

use slipguard_core::{ExtractionPattern, IssuerTemplate, PatternSource};

use crate::stats::CacheInfo;
use crate::ttl::TtlCache;

pub struct IssuerPatternCache {
    cache: TtlCache<IssuerTemplate>,
    max_patterns_per_field: usize,
}

impl IssuerPatternCache {
    pub fn new(ttl: Duration, cleanup_min_interval: Duration, max_patterns_per_field: usize) -> Self {
        Self {
            cache: TtlCache::new(ttl, cleanup_min_interval),
            max_patterns_per_field,
        }
    }

    /// Live template for an issuer, or `None` (a miss) when absent or
    /// expired. Repopulating from the store is the caller's job.
    pub fn get(&self, issuer_code: &str) -> Option<IssuerTemplate> {
        self.cache.get(issuer_code)
    }

    pub fn set(&self, template: IssuerTemplate) {
        self.cache.set(template.issuer_code.clone(), template);
    }

    /// Merge new patterns at the front of an issuer's list, re-applying the
    /// per-field cap. Creates the template if the issuer is unknown.
    pub fn update(&self, issuer_code: &str, new_patterns: Vec<ExtractionPattern>, source: PatternSource) {
        let max = self.max_patterns_per_field;
        self.cache.replace_with(issuer_code, |current| {
            let mut template = current
                .cloned()
                .unwrap_or_else(|| IssuerTemplate::new(issuer_code, source));
            template.prepend_patterns(new_patterns, max);
            template.update_source = source;
            template
        });
        debug!(issuer = issuer_code, "issuer cache updated");
    }

    pub fn invalidate(&self, issuer_code: &str) {
        self.cache.invalidate(issuer_code);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn should_cleanup(&self) -> bool {
        self.cache.should_cleanup()
    }

    pub fn get_cache_info(&self) -> CacheInfo {
        self.cache.info()
    }
}
