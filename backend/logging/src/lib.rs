//! Structured logging for the SlipGuard runtime.
//!
//! Wraps `tracing` with a console layer plus a daily-rolling NDJSON file
//! layer, and provides redaction for OCR snippets before they reach a log.

pub mod logger;
pub mod redact;

pub use logger::init_logger;
pub use redact::redact_ocr_text;
