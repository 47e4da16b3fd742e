//! Merchant overlay cache.
//!
//! Longer-lived than the issuer cache. Keys combine tenant and issuer so a
//! lookup can never cross a tenant boundary; there is no API that takes an
//! issuer without a tenant.

use std::time::Duration;

use tracing::debug;

use slipguard_core::{ExtractionPattern, MerchantPattern, MerchantPatternSet};

use crate::stats::CacheInfo;
use crate::ttl::TtlCache;

/// Unit separator keeps `tenant` and `issuer` from colliding no matter
/// what characters ids contain.
fn cache_key(tenant_id: &str, issuer_code: &str) -> String {
    format!("{tenant_id}\u{1f}{issuer_code}")
}

pub struct MerchantPatternCache {
    cache: TtlCache<MerchantPatternSet>,
    max_patterns: usize,
}

impl MerchantPatternCache {
    pub fn new(ttl: Duration, cleanup_min_interval: Duration, max_patterns: usize) -> Self {
        Self {
            cache: TtlCache::new(ttl, cleanup_min_interval),
            max_patterns,
        }
    }

    pub fn get(&self, tenant_id: &str, issuer_code: &str) -> Option<MerchantPatternSet> {
        self.cache.get(&cache_key(tenant_id, issuer_code))
    }

    pub fn set(&self, set: MerchantPatternSet) {
        let key = cache_key(&set.tenant_id, &set.issuer_code);
        self.cache.set(key, set);
    }

    /// Layer new refinements at the front for one (tenant, issuer) pair.
    /// Exact-regex duplicates are dropped; the entry is truncated to the
    /// cap, evicting the oldest refinements first.
    pub fn update(&self, tenant_id: &str, issuer_code: &str, new_patterns: Vec<ExtractionPattern>) {
        let max = self.max_patterns;
        let key = cache_key(tenant_id, issuer_code);
        self.cache.replace_with(&key, |current| {
            let mut set = current
                .cloned()
                .unwrap_or_else(|| MerchantPatternSet::new(tenant_id, issuer_code));
            let mut merged: Vec<MerchantPattern> =
                new_patterns.into_iter().map(MerchantPattern::new).collect();
            for existing in set.patterns.drain(..) {
                if merged.iter().any(|m| m.pattern.regex == existing.pattern.regex) {
                    continue;
                }
                merged.push(existing);
            }
            merged.truncate(max);
            set.patterns = merged;
            set.updated_at = chrono::Utc::now();
            set
        });
        debug!(tenant = tenant_id, issuer = issuer_code, "merchant cache updated");
    }

    /// Record whether a merchant pattern's extraction verified, updating
    /// its usage count and exponential success rate. The whole entry is
    /// replaced so concurrent readers see a consistent list.
    pub fn record_result(&self, tenant_id: &str, issuer_code: &str, regex: &str, success: bool) {
        let key = cache_key(tenant_id, issuer_code);
        self.cache.replace_with(&key, |current| {
            let mut set = current
                .cloned()
                .unwrap_or_else(|| MerchantPatternSet::new(tenant_id, issuer_code));
            for mp in &mut set.patterns {
                if mp.pattern.regex == regex {
                    mp.record_use(success);
                }
            }
            set
        });
    }

    pub fn invalidate(&self, tenant_id: &str, issuer_code: &str) {
        self.cache.invalidate(&cache_key(tenant_id, issuer_code));
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

#[cfg(test)]
mod tests {
    use super::*;
    use slipguard_core::{FieldType, PatternSource};

    fn cache() -> MerchantPatternCache {
        MerchantPatternCache::new(Duration::from_secs(86_400), Duration::from_secs(1800), 2)
    }

    fn pattern(regex: &str) -> ExtractionPattern {
        ExtractionPattern::new(FieldType::Amount, regex, 0.9, PatternSource::MerchantLearning)
    }

    #[test]
    fn lookups_are_tenant_scoped() {
        let c = cache();
        c.update("tenant-a", "ABA", vec![pattern(r"Paid\s+([\d,]+)")]);
        assert!(c.get("tenant-a", "ABA").is_some());
        // Tenant B never sees tenant A's refinements.
        assert!(c.get("tenant-b", "ABA").is_none());
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let c = cache();
        c.update("t", "WING", vec![pattern(r"One\s+([\d,]+)")]);
        c.update("t", "WING", vec![pattern(r"Two\s+([\d,]+)")]);
        c.update("t", "WING", vec![pattern(r"Three\s+([\d,]+)")]);
        let set = c.get("t", "WING").unwrap();
        assert_eq!(set.patterns.len(), 2);
        assert!(set.patterns[0].pattern.regex.contains("Three"));
        assert!(set.patterns[1].pattern.regex.contains("Two"));
    }

    #[test]
    fn record_result_updates_usage() {
        let c = cache();
        c.update("t", "ABA", vec![pattern(r"Paid\s+([\d,]+)")]);
        c.record_result("t", "ABA", r"Paid\s+([\d,]+)", true);
        c.record_result("t", "ABA", r"Paid\s+([\d,]+)", false);
        let set = c.get("t", "ABA").unwrap();
        assert_eq!(set.patterns[0].usage_count, 2);
        assert!(set.patterns[0].success_rate < 1.0);
    }
}
