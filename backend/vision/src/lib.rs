//! Vision OCR provider client.
//!
//! The expensive fallback path: ships the raw screenshot (base64) plus
//! hint fields to the configured provider and maps its verdict into our
//! types. Time-bounded so one slow provider call can never stall the
//! training scheduler or pile up request tasks.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::{info, warn};

use slipguard_config::VisionConfig;
use slipguard_core::{PaymentFields, SlipError, VisionHints, VisionOcr, VisionVerdict};

#[derive(Debug)]
pub struct HttpVisionOcr {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpVisionOcr {
    pub fn from_config(cfg: &VisionConfig) -> Result<Self, SlipError> {
        if cfg.endpoint.is_empty() {
            return Err(SlipError::Config("vision.endpoint is not configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| SlipError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            timeout_secs: cfg.timeout_secs,
        })
    }
}

/// Provider wire format.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    status: String,
    #[serde(default)]
    fields: ProviderFields,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    raw_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderFields {
    recipient_name: Option<String>,
    account_number: Option<String>,
    amount: Option<f64>,
}

fn parse_response(body: &str) -> Result<VisionVerdict, SlipError> {
    let parsed: ProviderResponse = serde_json::from_str(body).map_err(|e| SlipError::Provider {
        message: format!("unparseable provider response: {e}"),
    })?;
    Ok(VisionVerdict {
        verified: parsed.status == "verified",
        fields: PaymentFields {
            recipient_name: parsed.fields.recipient_name,
            account_number: parsed.fields.account_number,
            amount: parsed.fields.amount,
        },
        confidence: parsed.confidence,
        raw_text: parsed.raw_text,
    })
}

#[async_trait]
impl VisionOcr for HttpVisionOcr {
    async fn verify_image(
        &self,
        image: &[u8],
        mime_type: &str,
        hints: &VisionHints,
    ) -> Result<VisionVerdict, SlipError> {
        let b64 = STANDARD.encode(image);
        let body = serde_json::json!({
            "image": b64,
            "mime_type": mime_type,
            "hints": hints,
        });

        info!(bytes = image.len(), "submitting screenshot to vision provider");
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SlipError::ProviderTimeout(self.timeout_secs)
                } else {
                    SlipError::Provider { message: e.to_string() }
                }
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| SlipError::Provider {
            message: format!("failed reading provider response: {e}"),
        })?;
        if !status.is_success() {
            warn!(status = %status, "vision provider returned an error");
            return Err(SlipError::Provider {
                message: format!("HTTP {status}: {text}"),
            });
        }
        parse_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_verified_response() {
        let body = r#"{
            "status": "verified",
            "fields": { "recipient_name": "JOHN DOE", "account_number": "012-345-678", "amount": 50000.0 },
            "confidence": 0.97,
            "raw_text": "Transfer to JOHN DOE ..."
        }"#;
        let verdict = parse_response(body).unwrap();
        assert!(verdict.verified);
        assert_eq!(verdict.fields.recipient_name.as_deref(), Some("JOHN DOE"));
        assert!((verdict.confidence - 0.97).abs() < 1e-9);
    }

    #[test]
    fn rejected_status_is_not_verified() {
        let body = r#"{ "status": "rejected", "confidence": 0.9 }"#;
        let verdict = parse_response(body).unwrap();
        assert!(!verdict.verified);
        assert!(verdict.fields.is_empty());
    }

    #[test]
    fn garbage_body_maps_to_provider_error() {
        let err = parse_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, SlipError::Provider { .. }));
    }

    #[test]
    fn empty_endpoint_is_a_config_error() {
        let err = HttpVisionOcr::from_config(&VisionConfig::default()).unwrap_err();
        assert!(matches!(err, SlipError::Config(_)));
    }
}
