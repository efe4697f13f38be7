//! # StudyScan OCR Pipeline
//!
//! Quota-aware, rate-limited, multi-provider image-to-text extraction for
//! the StudyScan tutoring app. A paid cloud provider with strict usage
//! quotas is fronted by a usage ledger (per-user daily and global monthly
//! caps) and a sliding-window rate limiter; on exhaustion or failure an
//! ordered fallback chain tries an unlimited cloud provider and finally a
//! local Tesseract engine. Results are normalized into reading order and
//! scrubbed of recognition garbage regardless of which provider produced
//! them.

pub mod config;
pub mod errors;
pub mod layout;
pub mod pipeline;
pub mod providers;
pub mod rate_limiter;
pub mod sanitizer;
pub mod usage_ledger;

pub use errors::{OcrError, ProviderStage, QuotaScope};
pub use pipeline::{OcrPipeline, OcrResult, ProviderSource};
