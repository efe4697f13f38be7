//! # OCR Provider Modules
//!
//! Defines the common provider interface and the three concrete providers
//! attempted by the fallback chain: the quota-limited primary cloud service
//! (submit/poll), the unlimited secondary cloud service (single
//! request/response), and the offline Tesseract engine.

pub mod local;
pub mod primary;
pub mod unlimited;

use async_trait::async_trait;

use crate::config::MAX_IMAGE_BYTES;
use crate::errors::OcrError;

/// Raw output of a single provider before sanitization
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    /// Recognized text in reading order
    pub text: String,
    /// Recognition confidence, 0–100; 0.0 means "unknown", not "low"
    pub confidence: f64,
    /// Number of pages the provider recognized
    pub page_count: u32,
}

/// A service that turns image bytes into text
///
/// Implementations own their wire format and polling behavior; the chain
/// only sees "submit image, get back text with confidence".
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extract text from the given image bytes
    async fn recognize(&self, image: &[u8]) -> Result<ProviderOutput, OcrError>;

    /// Short provider name used in logs and error messages
    fn name(&self) -> &str;
}

/// Validate an image payload before any provider is attempted
///
/// Rejects empty payloads, payloads above the size cap, and bytes whose
/// magic number is not a format every provider in the chain can handle
/// (PNG, JPEG, BMP, TIFF). Rejected payloads consume no quota.
pub fn validate_image_bytes(image: &[u8]) -> Result<(), OcrError> {
    if image.is_empty() {
        return Err(OcrError::Validation("image payload is empty".to_string()));
    }

    if image.len() > MAX_IMAGE_BYTES {
        return Err(OcrError::Validation(format!(
            "image payload too large: {} bytes (maximum allowed: {} bytes)",
            image.len(),
            MAX_IMAGE_BYTES
        )));
    }

    match image::guess_format(image) {
        Ok(format) => {
            let supported = matches!(
                format,
                image::ImageFormat::Png
                    | image::ImageFormat::Jpeg
                    | image::ImageFormat::Bmp
                    | image::ImageFormat::Tiff
            );
            if supported {
                Ok(())
            } else {
                Err(OcrError::Validation(format!(
                    "unsupported image format: {format:?}"
                )))
            }
        }
        Err(e) => Err(OcrError::Validation(format!(
            "could not determine image format: {e}"
        ))),
    }
}
