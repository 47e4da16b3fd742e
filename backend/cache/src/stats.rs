//! Read-only cache statistics for the operator surface.

use serde::Serialize;

/// Per-key accounting.
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    pub key: String,
    pub hits: u64,
    pub misses: u64,
    /// Seconds since the entry was cached; `None` when the key has stats
    /// but no live entry.
    pub age_secs: Option<u64>,
}

/// Snapshot returned by `get_cache_info()`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses); 0.0 before any traffic.
    pub hit_rate: f64,
    /// Every key with recorded traffic, most-accessed first.
    pub keys: Vec<KeyInfo>,
    /// The most-accessed keys, capped for display.
    pub top_keys: Vec<String>,
}
