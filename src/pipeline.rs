//! # OCR Pipeline Module
//!
//! The orchestration facade and fallback chain. `extract_text` is the single
//! entry point: it consults the usage ledger and rate limiter, attempts the
//! primary provider, and on any disqualifying condition or failure walks the
//! fixed fallback order (Primary → Unlimited → Local), tagging every result
//! with its provenance. Callers receive either a usable result or one
//! terminal `AllProvidersExhausted` error, never a partial state.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::errors::OcrError;
use crate::providers::{validate_image_bytes, OcrProvider, ProviderOutput};
use crate::rate_limiter::RateLimiter;
use crate::sanitizer::TextSanitizer;
use crate::usage_ledger::{QuotaRemaining, ReserveOutcome, UsageLedger};

/// Which provider produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSource {
    /// Quota-limited primary cloud provider
    Primary,
    /// Unlimited secondary cloud provider
    Unlimited,
    /// Offline Tesseract engine
    Local,
}

/// Canonical extraction result returned to callers
///
/// Immutable once constructed; `is_fallback` always equals
/// `source != Primary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Sanitized text in reading order
    pub text: String,
    /// Recognition confidence, 0–100; 0.0 means "unknown"
    pub confidence: f64,
    /// Number of recognized pages
    pub page_count: u32,
    /// Provider that produced this result
    pub source: ProviderSource,
    /// Whether a fallback provider produced this result
    pub is_fallback: bool,
    /// Human-readable reason the earlier provider(s) were skipped or failed
    pub fallback_reason: Option<String>,
}

/// Quota-aware, rate-limited, multi-provider OCR orchestration
///
/// Providers later in the chain are never preferred over an available
/// earlier one: cost and quality decrease monotonically along the chain.
pub struct OcrPipeline {
    ledger: UsageLedger,
    limiter: RateLimiter,
    sanitizer: TextSanitizer,
    primary: Option<Box<dyn OcrProvider>>,
    unlimited: Option<Box<dyn OcrProvider>>,
    local: Option<Box<dyn OcrProvider>>,
}

impl OcrPipeline {
    /// Create a pipeline with no providers attached
    pub fn new(ledger: UsageLedger, config: &PipelineConfig) -> Self {
        Self {
            ledger,
            limiter: RateLimiter::new(config.rate_limit.clone()),
            sanitizer: TextSanitizer::new(config.sanitize.clone()),
            primary: None,
            unlimited: None,
            local: None,
        }
    }

    /// Attach the quota-limited primary provider
    pub fn with_primary(mut self, provider: Box<dyn OcrProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Attach the unlimited secondary provider
    pub fn with_unlimited(mut self, provider: Box<dyn OcrProvider>) -> Self {
        self.unlimited = Some(provider);
        self
    }

    /// Attach the offline tertiary provider
    pub fn with_local(mut self, provider: Box<dyn OcrProvider>) -> Self {
        self.local = Some(provider);
        self
    }

    /// Extract text from an image for the given user
    ///
    /// Step order is fixed: quota reservation, rate-limit admission, primary
    /// provider call, commit. The reservation counts the call at admission
    /// time, inside the same transaction as the cap comparison, so two
    /// concurrent requests can never both squeeze past a near-cap check; a
    /// failed or cancelled attempt drops the reservation and consumes no
    /// quota. Quota and provider errors select the next provider in the
    /// chain and surface only as `fallback_reason` on the eventual result;
    /// the sole errors callers see are an invalid image payload and
    /// `AllProvidersExhausted`.
    pub async fn extract_text(
        &self,
        image: &[u8],
        user_id: &str,
        is_paid_user: bool,
    ) -> Result<OcrResult, OcrError> {
        validate_image_bytes(image)?;

        let primary_reason = match &self.primary {
            None => "primary_unconfigured".to_string(),
            Some(provider) => match self.ledger.reserve(user_id, is_paid_user) {
                Ok(ReserveOutcome::Reserved(reservation)) => {
                    // Rate limits are the provider's own constraint and are
                    // enforced even with quota remaining, once per primary
                    // attempt and never for fallback attempts.
                    self.limiter.await_slot().await;
                    match provider.recognize(image).await {
                        Ok(output) => {
                            reservation.commit();
                            return Ok(self.finish(output, ProviderSource::Primary, None));
                        }
                        Err(e) => {
                            // Dropping the reservation gives the count back
                            drop(reservation);
                            warn!("Primary provider failed, falling back: {e}");
                            e.reason()
                        }
                    }
                }
                Ok(ReserveOutcome::Exhausted(scope)) => {
                    let err = OcrError::QuotaExceeded(scope);
                    info!("Skipping primary provider for user {user_id}: {err}");
                    err.reason()
                }
                Err(e) => {
                    // A broken ledger must not cause unaccounted paid usage
                    warn!("Quota reservation failed, skipping primary provider: {e:#}");
                    "storage_error".to_string()
                }
            },
        };

        let unlimited_reason = match &self.unlimited {
            None => "unlimited_unconfigured".to_string(),
            Some(provider) => match provider.recognize(image).await {
                Ok(output) => {
                    info!("Served via unlimited provider (reason: {primary_reason})");
                    return Ok(self.finish(
                        output,
                        ProviderSource::Unlimited,
                        Some(primary_reason),
                    ));
                }
                Err(e) => {
                    warn!("Unlimited provider failed, falling back: {e}");
                    e.reason()
                }
            },
        };

        let local_reason = match &self.local {
            None => "local_unconfigured".to_string(),
            Some(provider) => match provider.recognize(image).await {
                Ok(output) => {
                    let escalated = format!("{primary_reason}; unlimited: {unlimited_reason}");
                    info!("Served via local provider (reason: {escalated})");
                    return Ok(self.finish(output, ProviderSource::Local, Some(escalated)));
                }
                Err(e) => {
                    warn!("Local provider failed: {e}");
                    e.reason()
                }
            },
        };

        error!(
            "All providers exhausted for user {user_id}: primary={primary_reason}, \
             unlimited={unlimited_reason}, local={local_reason}"
        );
        Err(OcrError::AllProvidersExhausted {
            reasons: [primary_reason, unlimited_reason, local_reason],
        })
    }

    /// Remaining daily and monthly quota for a user
    pub fn remaining(
        &self,
        user_id: &str,
        is_paid_user: bool,
    ) -> Result<QuotaRemaining, OcrError> {
        Ok(self.ledger.remaining(user_id, is_paid_user)?)
    }

    /// Sanitize provider output and stamp it with its provenance
    fn finish(
        &self,
        output: ProviderOutput,
        source: ProviderSource,
        fallback_reason: Option<String>,
    ) -> OcrResult {
        OcrResult {
            text: self.sanitizer.sanitize(&output.text),
            confidence: output.confidence,
            page_count: output.page_count,
            source,
            is_fallback: source != ProviderSource::Primary,
            fallback_reason,
        }
    }
}
