//! # Local Provider Module
//!
//! Offline OCR via the Tesseract engine, the last resort of the fallback
//! chain. Tesseract instances are cached per language combination because
//! engine initialization costs 100–500ms; a cached instance is reused for
//! every subsequent extraction with the same languages.

use async_trait::async_trait;
use leptess::LepTess;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{OcrError, ProviderStage};
use crate::providers::{OcrProvider, ProviderOutput};

pub const DEFAULT_LANGUAGES: &str = "eng";

/// Offline Tesseract-backed OCR provider with instance reuse
pub struct LocalClient {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
    languages: String,
}

impl LocalClient {
    /// Create a provider using the default language configuration
    pub fn new() -> Self {
        Self::with_languages(DEFAULT_LANGUAGES)
    }

    /// Create a provider for the given Tesseract language codes (e.g. "eng+fra")
    pub fn with_languages(languages: &str) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            languages: languages.to_string(),
        }
    }

    /// Get or create the Tesseract instance for this provider's languages
    fn get_instance(&self) -> Result<Arc<Mutex<LepTess>>, OcrError> {
        let key = self.languages.clone();

        {
            let instances = self.instances.lock().unwrap();
            if let Some(instance) = instances.get(&key) {
                return Ok(Arc::clone(instance));
            }
        }

        info!("Creating new Tesseract instance for languages: {key}");
        let tess = LepTess::new(None, &key).map_err(|e| {
            OcrError::provider(
                ProviderStage::ProcessingFailed,
                format!("failed to initialize Tesseract: {e}"),
            )
        })?;

        let instance = Arc::new(Mutex::new(tess));

        {
            let mut instances = self.instances.lock().unwrap();
            instances.insert(key, Arc::clone(&instance));
        }

        Ok(instance)
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrProvider for LocalClient {
    async fn recognize(&self, image: &[u8]) -> Result<ProviderOutput, OcrError> {
        let instance = self.get_instance()?;
        let mut tess = instance.lock().unwrap();

        tess.set_image_from_mem(image).map_err(|e| {
            OcrError::provider(
                ProviderStage::ProcessingFailed,
                format!("failed to load image: {e}"),
            )
        })?;

        let raw_text = tess.get_utf8_text().map_err(|e| {
            OcrError::provider(
                ProviderStage::ProcessingFailed,
                format!("failed to extract text: {e}"),
            )
        })?;

        // Tesseract reports mean confidence directly on the 0-100 scale
        let confidence = f64::from(tess.mean_text_conf());

        let text = raw_text
            .trim()
            .lines()
            .map(str::trim)
            .collect::<Vec<&str>>()
            .join("\n");

        info!(
            "Local Tesseract extraction completed: {} chars at confidence {confidence:.0}",
            text.len()
        );

        Ok(ProviderOutput {
            text,
            confidence,
            page_count: 1,
        })
    }

    fn name(&self) -> &str {
        "local-tesseract"
    }
}
