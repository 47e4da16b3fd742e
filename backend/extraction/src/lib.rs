//! Pattern extraction for payment screenshots.
//!
//! Stateless building blocks of the cheap verification path: issuer
//! detection by keyword scoring, candidate regex derivation from a
//! verified payment, pattern normalization, the built-in fallback table,
//! and ordered pattern application against OCR text.

pub mod apply;
pub mod candidates;
pub mod fallback;
pub mod issuers;
pub mod normalize;

pub use apply::{apply_patterns, FieldMatch};
pub use candidates::extract_candidate_patterns;
pub use fallback::builtin_fallback_patterns;
pub use issuers::detect_issuer;
pub use normalize::normalize_pattern;
