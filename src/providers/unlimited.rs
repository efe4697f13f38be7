//! # Unlimited Provider Client Module
//!
//! Client for the secondary cloud OCR service. Unlike the primary provider
//! it has no usage quota and a plain synchronous request/response contract:
//! one POST of the image bytes, one JSON body back with the recognized text
//! and an optional confidence figure.

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::config::UnlimitedProviderConfig;
use crate::errors::{OcrError, ProviderStage};
use crate::providers::{OcrProvider, ProviderOutput};

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    text: String,
    /// Confidence in 0–100; absent means "unknown", mapped to 0.0
    #[serde(default)]
    confidence: Option<f64>,
}

/// Client for the unlimited secondary provider
pub struct UnlimitedClient {
    http: reqwest::Client,
    config: UnlimitedProviderConfig,
}

impl UnlimitedClient {
    /// Create a client for the given endpoint
    pub fn new(config: UnlimitedProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl OcrProvider for UnlimitedClient {
    async fn recognize(&self, image: &[u8]) -> Result<ProviderOutput, OcrError> {
        debug!("Submitting {} byte image to unlimited provider", image.len());

        let mut request = self
            .http
            .post(&self.config.endpoint)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec());

        if let Some(api_key) = &self.config.api_key {
            request = request.header("X-Api-Key", api_key);
        }

        let response = request.send().await.map_err(|e| {
            OcrError::provider(ProviderStage::SubmissionFailed, format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            return Err(OcrError::provider(
                ProviderStage::SubmissionFailed,
                format!("unexpected status {}", response.status()),
            ));
        }

        let body: RecognizeResponse = response.json().await.map_err(|e| {
            OcrError::provider(
                ProviderStage::ProcessingFailed,
                format!("malformed response body: {e}"),
            )
        })?;

        info!(
            "Unlimited provider returned {} chars of text",
            body.text.len()
        );

        Ok(ProviderOutput {
            text: body.text,
            confidence: body.confidence.unwrap_or(0.0),
            page_count: 1,
        })
    }

    fn name(&self) -> &str {
        "unlimited-cloud"
    }
}
