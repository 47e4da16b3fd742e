//! In-memory, TTL-bounded pattern caches.
//!
//! Two layers sit in front of the durable template store: an issuer-level
//! cache (short TTL) and a per-tenant merchant overlay (long TTL). Both are
//! disposable projections; the store can rebuild them at any time. All
//! methods are synchronous and do no I/O; population on a miss is the
//! caller's job.

pub mod issuer;
pub mod merchant;
pub mod stats;
pub mod ttl;

pub use issuer::IssuerPatternCache;
pub use merchant::MerchantPatternCache;
pub use stats::{CacheInfo, KeyInfo};
pub use ttl::TtlCache;
