//! Cost-savings telemetry.
//!
//! Every request served by pattern extraction is one provider call we did
//! not pay for. Counters are atomics so concurrent request tasks never
//! contend on a lock for bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of the savings counters.
#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub pattern_served: u64,
    pub fallback_served: u64,
    pub total_requests: u64,
    /// Share of requests that skipped the provider; 0.0 before any traffic.
    pub pattern_share: f64,
    /// pattern_served x provider cost per call.
    pub saved_usd: f64,
}

pub struct CostTracker {
    pattern_served: AtomicU64,
    fallback_served: AtomicU64,
    provider_cost_usd: f64,
}

impl CostTracker {
    pub fn new(provider_cost_usd: f64) -> Self {
        Self {
            pattern_served: AtomicU64::new(0),
            fallback_served: AtomicU64::new(0),
            provider_cost_usd,
        }
    }

    /// A request was decided without the provider.
    pub fn record_pattern_served(&self) {
        self.pattern_served.fetch_add(1, Ordering::Relaxed);
    }

    /// A request went to the expensive fallback.
    pub fn record_fallback(&self) {
        self.fallback_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> CostReport {
        let pattern_served = self.pattern_served.load(Ordering::Relaxed);
        let fallback_served = self.fallback_served.load(Ordering::Relaxed);
        let total = pattern_served + fallback_served;
        CostReport {
            pattern_served,
            fallback_served,
            total_requests: total,
            pattern_share: if total == 0 {
                0.0
            } else {
                pattern_served as f64 / total as f64
            },
            saved_usd: pattern_served as f64 * self.provider_cost_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savings_grow_only_on_the_pattern_path() {
        let tracker = CostTracker::new(0.01);
        tracker.record_pattern_served();
        tracker.record_pattern_served();
        tracker.record_fallback();

        let report = tracker.report();
        assert_eq!(report.pattern_served, 2);
        assert_eq!(report.fallback_served, 1);
        assert_eq!(report.total_requests, 3);
        assert!((report.saved_usd - 0.02).abs() < 1e-9);
        assert!((report.pattern_share - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_tracker_reports_zeroes() {
        let report = CostTracker::new(0.01).report();
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.pattern_share, 0.0);
        assert_eq!(report.saved_usd, 0.0);
    }
}
