//! Ordered pattern application.
//!
//! Patterns are tried in priority order per field type; the first regex
//! that matches wins that field. A pattern that fails to compile is
//! skipped, never aborting the pass.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use slipguard_core::{ExtractionPattern, FieldType, PatternSource};

/// One extracted field value and the pattern evidence behind it.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    pub field_type: FieldType,
    pub value: String,
    pub confidence: f64,
    pub source: PatternSource,
    /// The regex that produced the value.
    pub regex: String,
}

/// Apply patterns (already in priority order) to OCR text. Returns the
/// first match per field type.
pub fn apply_patterns(
    ocr_text: &str,
    patterns: &[ExtractionPattern],
) -> HashMap<FieldType, FieldMatch> {
    let mut matches: HashMap<FieldType, FieldMatch> = HashMap::new();

    for pattern in patterns {
        if matches.contains_key(&pattern.field_type) {
            continue;
        }
        let re = match Regex::new(&pattern.regex) {
            Ok(re) => re,
            Err(e) => {
                debug!(
                    field = pattern.field_type.as_str(),
                    pattern = %pattern.regex,
                    error = %e,
                    "skipping invalid pattern"
                );
                continue;
            }
        };
        if let Some(caps) = re.captures(ocr_text) {
            if let Some(value) = caps.get(1) {
                let value = value.as_str().trim();
                if value.is_empty() {
                    continue;
                }
                matches.insert(
                    pattern.field_type,
                    FieldMatch {
                        field_type: pattern.field_type,
                        value: value.to_string(),
                        confidence: pattern.confidence,
                        source: pattern.source,
                        regex: pattern.regex.clone(),
                    },
                );
            }
        }
    }

    matches
}
