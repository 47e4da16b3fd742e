//! Verification decision layer.
//!
//! The hot path of the runtime: detect the issuer, extract fields with
//! cheap learned patterns, verify them against the expected payment, and
//! only fall back to the expensive vision provider when confidence is
//! insufficient. Every verified outcome feeds the learning queue so the
//! cheap share grows over time.

pub mod cost;
pub mod pipeline;
pub mod verify;

pub use cost::{CostReport, CostTracker};
pub use pipeline::{VerificationPipeline, VerificationRequest};
pub use verify::verify_fields;
