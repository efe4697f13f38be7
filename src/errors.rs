//! # OCR Error Types Module
//!
//! This module defines the error taxonomy used throughout the OCR pipeline.
//! Quota and provider errors are recovered internally by the fallback chain;
//! only `AllProvidersExhausted` surfaces to callers.

/// Scope of an exhausted quota counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    /// Per-user daily cap reached
    Daily,
    /// Global monthly cap reached
    Monthly,
}

impl QuotaScope {
    /// Machine-readable reason string attached to fallback results
    pub fn reason(&self) -> &'static str {
        match self {
            QuotaScope::Daily => "daily_exhausted",
            QuotaScope::Monthly => "monthly_exhausted",
        }
    }
}

/// Stage at which a primary-provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStage {
    /// Submission request failed or lacked a poll location
    SubmissionFailed,
    /// Provider reported the job as failed
    ProcessingFailed,
    /// Poll loop exhausted its attempt budget without a terminal status
    Timeout,
    /// A status request itself errored
    PollFailed,
}

impl ProviderStage {
    /// Machine-readable reason string attached to fallback results
    pub fn reason(&self) -> &'static str {
        match self {
            ProviderStage::SubmissionFailed => "submission_failed",
            ProviderStage::ProcessingFailed => "processing_failed",
            ProviderStage::Timeout => "timeout",
            ProviderStage::PollFailed => "poll_failed",
        }
    }
}

/// Custom error types for OCR pipeline operations
#[derive(Debug, Clone)]
pub enum OcrError {
    /// Image payload validation errors
    Validation(String),
    /// Quota cap reached for the given scope
    QuotaExceeded(QuotaScope),
    /// A provider call failed at the given stage
    Provider { stage: ProviderStage, message: String },
    /// Quota counter storage errors
    Storage(String),
    /// Every provider in the chain failed; reasons in chain order
    AllProvidersExhausted { reasons: [String; 3] },
}

impl OcrError {
    /// Convenience constructor for provider failures
    pub fn provider(stage: ProviderStage, message: impl Into<String>) -> Self {
        OcrError::Provider {
            stage,
            message: message.into(),
        }
    }

    /// Short reason string used as `fallback_reason` provenance
    pub fn reason(&self) -> String {
        match self {
            OcrError::Validation(_) => "invalid_image".to_string(),
            OcrError::QuotaExceeded(scope) => scope.reason().to_string(),
            OcrError::Provider { stage, .. } => stage.reason().to_string(),
            OcrError::Storage(_) => "storage_error".to_string(),
            OcrError::AllProvidersExhausted { .. } => "all_providers_exhausted".to_string(),
        }
    }
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::Validation(msg) => write!(f, "Validation error: {msg}"),
            OcrError::QuotaExceeded(QuotaScope::Daily) => {
                write!(f, "Quota exceeded: daily cap reached")
            }
            OcrError::QuotaExceeded(QuotaScope::Monthly) => {
                write!(f, "Quota exceeded: monthly cap reached")
            }
            OcrError::Provider { stage, message } => {
                write!(f, "Provider error ({}): {message}", stage.reason())
            }
            OcrError::Storage(msg) => write!(f, "Storage error: {msg}"),
            OcrError::AllProvidersExhausted { reasons } => write!(
                f,
                "All providers exhausted: primary={}, unlimited={}, local={}",
                reasons[0], reasons[1], reasons[2]
            ),
        }
    }
}

impl std::error::Error for OcrError {}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Storage(err.to_string())
    }
}
