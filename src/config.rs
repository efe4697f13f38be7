//! # Pipeline Configuration Module
//!
//! This module defines configuration structures for the OCR pipeline,
//! including quota caps, rate-limit settings, poll parameters, and the
//! empirically chosen layout/sanitization thresholds.

use std::time::Duration;

// Constants for quota accounting
pub const DAILY_CAP_FREE: u32 = 5;
pub const DAILY_CAP_PAID: u32 = 10;
pub const MONTHLY_CAP: u32 = 5000;

// Constants for rate limiting against the primary provider
pub const RATE_WINDOW_SECS: u64 = 60;
pub const MAX_CALLS_PER_WINDOW: u32 = 20;
pub const MIN_GAP_SECS: u64 = 3;

// Constants for the submit/poll protocol
pub const POLL_INTERVAL_MS: u64 = 1000;
pub const MAX_POLL_ATTEMPTS: u32 = 30;

// Layout reconstruction thresholds. Empirically chosen; changing them
// changes observable reading order, so they are configuration rather
// than derived values.
pub const SAME_ROW_THRESHOLD: f64 = 10.0;
pub const PARAGRAPH_GAP_THRESHOLD: f64 = 20.0;

// Sanitizer threshold: lines with a higher fraction of non-linguistic
// characters are dropped outright.
pub const GARBAGE_RATIO_THRESHOLD: f64 = 0.7;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024; // 10MB limit for uploads

/// Quota caps for the primary provider
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Daily cap for free-tier users
    pub daily_cap_free: u32,
    /// Daily cap for paid-tier users
    pub daily_cap_paid: u32,
    /// Global monthly cap shared by all users
    pub monthly_cap: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_cap_free: DAILY_CAP_FREE,
            daily_cap_paid: DAILY_CAP_PAID,
            monthly_cap: MONTHLY_CAP,
        }
    }
}

impl QuotaConfig {
    /// Daily cap for a user, selected purely by payment tier
    pub fn daily_cap(&self, is_paid_user: bool) -> u32 {
        if is_paid_user {
            self.daily_cap_paid
        } else {
            self.daily_cap_free
        }
    }
}

/// Rate-limit settings for the primary provider
///
/// These mirror limits imposed by the provider itself and apply
/// independently of remaining quota.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sliding window size
    pub window: Duration,
    /// Maximum calls admitted per window
    pub max_calls_per_window: u32,
    /// Minimum gap between consecutive calls
    pub min_gap: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(RATE_WINDOW_SECS),
            max_calls_per_window: MAX_CALLS_PER_WINDOW,
            min_gap: Duration::from_secs(MIN_GAP_SECS),
        }
    }
}

/// Poll-loop settings for the primary provider's asynchronous protocol
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between consecutive status requests
    pub interval: Duration,
    /// Maximum status requests before the job times out
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(POLL_INTERVAL_MS),
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

/// Reading-order reconstruction thresholds
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Lines whose vertical positions differ by less than this share a row
    pub same_row_threshold: f64,
    /// Vertical gap above which a blank separator line is inserted
    pub paragraph_gap_threshold: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            same_row_threshold: SAME_ROW_THRESHOLD,
            paragraph_gap_threshold: PARAGRAPH_GAP_THRESHOLD,
        }
    }
}

/// Text sanitization settings
#[derive(Debug, Clone)]
pub struct SanitizeConfig {
    /// Lines with a garbage ratio above this are dropped entirely
    pub garbage_ratio_threshold: f64,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            garbage_ratio_threshold: GARBAGE_RATIO_THRESHOLD,
        }
    }
}

/// Aggregate configuration for the OCR pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub quota: QuotaConfig,
    pub rate_limit: RateLimitConfig,
    pub poll: PollConfig,
    pub layout: LayoutConfig,
    pub sanitize: SanitizeConfig,
}

/// Connection settings for the primary (quota-limited) cloud provider
#[derive(Debug, Clone)]
pub struct PrimaryProviderConfig {
    /// Submission endpoint URL
    pub endpoint: String,
    /// Subscription credential sent on every request
    pub api_key: String,
}

impl PrimaryProviderConfig {
    /// Read primary provider settings from the environment
    ///
    /// Returns `None` when either `PRIMARY_OCR_ENDPOINT` or
    /// `PRIMARY_OCR_KEY` is unset; the pipeline then starts without a
    /// primary provider and serves everything through the fallbacks.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("PRIMARY_OCR_ENDPOINT").ok()?;
        let api_key = std::env::var("PRIMARY_OCR_KEY").ok()?;
        Some(Self { endpoint, api_key })
    }
}

/// Connection settings for the unlimited secondary provider
#[derive(Debug, Clone)]
pub struct UnlimitedProviderConfig {
    /// Request endpoint URL
    pub endpoint: String,
    /// Optional API key sent as a header when present
    pub api_key: Option<String>,
}

impl UnlimitedProviderConfig {
    /// Read secondary provider settings from the environment
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("UNLIMITED_OCR_ENDPOINT").ok()?;
        let api_key = std::env::var("UNLIMITED_OCR_KEY").ok();
        Some(Self { endpoint, api_key })
    }
}
