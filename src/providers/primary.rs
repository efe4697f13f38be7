//! # Primary Provider Client Module
//!
//! Client for the quota-limited primary cloud OCR service. The service uses
//! an asynchronous submit/poll protocol: submission returns a poll location
//! in the `Operation-Location` header, and the result is fetched by polling
//! that location until a terminal status appears. The proprietary result
//! format (pages of positioned lines) is normalized into reading-ordered
//! text here via the layout module.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::time::sleep;

use crate::config::{LayoutConfig, PollConfig, PrimaryProviderConfig};
use crate::errors::{OcrError, ProviderStage};
use crate::layout::{average_confidence, reconstruct_reading_order, TextLine};
use crate::providers::{OcrProvider, ProviderOutput};

/// Header carrying the subscription credential on every request
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Poll-loop state of a submitted recognition job
///
/// Terminal states (`Succeeded`, `Failed`, `TimedOut`) are never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Submitted, no status request issued yet
    Submitted,
    /// At least one status request returned a non-terminal status
    Polling,
    /// Provider reported the job done; result has been extracted
    Succeeded,
    /// Provider reported the job failed
    Failed,
    /// Attempt budget exhausted without a terminal status
    TimedOut,
}

/// An in-flight recognition job against the primary provider
#[derive(Debug, Clone)]
pub struct OcrJob {
    /// URL to poll for the job's status and result
    pub poll_location: String,
    /// Number of status requests issued so far
    pub attempts: u32,
    /// Current position in the job state machine
    pub status: JobStatus,
}

// Wire format of the poll response: a status field plus, when succeeded,
// pages of positioned lines.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    read_results: Vec<PageResult>,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    #[serde(default)]
    lines: Vec<LineResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineResult {
    text: String,
    /// `[x, y, width, height]` of the line's bounding box
    #[serde(default)]
    bounding_box: Vec<f64>,
    /// Line confidence in 0–1, absent on some service tiers
    #[serde(default)]
    confidence: Option<f64>,
}

/// Client for the primary provider's submit/poll protocol
pub struct PrimaryClient {
    http: reqwest::Client,
    config: PrimaryProviderConfig,
    poll: PollConfig,
    layout: LayoutConfig,
}

impl PrimaryClient {
    /// Create a client for the given endpoint and credential
    pub fn new(config: PrimaryProviderConfig, poll: PollConfig, layout: LayoutConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            poll,
            layout,
        }
    }

    /// Submit an image for recognition
    ///
    /// One HTTP call that must return a success status and a poll location;
    /// anything else fails with `submission_failed`.
    pub async fn submit(&self, image: &[u8]) -> Result<OcrJob, OcrError> {
        debug!("Submitting {} byte image to primary provider", image.len());

        let response = self
            .http
            .post(&self.config.endpoint)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                OcrError::provider(ProviderStage::SubmissionFailed, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(OcrError::provider(
                ProviderStage::SubmissionFailed,
                format!("unexpected status {}", response.status()),
            ));
        }

        let poll_location = response
            .headers()
            .get("Operation-Location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                OcrError::provider(
                    ProviderStage::SubmissionFailed,
                    "response lacked a poll location",
                )
            })?;

        Ok(OcrJob {
            poll_location,
            attempts: 0,
            status: JobStatus::Submitted,
        })
    }

    /// Issue one status request for a submitted job
    ///
    /// Returns `Ok(Some(output))` when the job succeeded, `Ok(None)` when it
    /// is still in flight. A failed job or an erroring status request fails
    /// the job; retry decisions belong to the fallback chain, not here.
    pub async fn poll_once(&self, job: &mut OcrJob) -> Result<Option<ProviderOutput>, OcrError> {
        job.attempts += 1;

        let response = self
            .http
            .get(&job.poll_location)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                job.status = JobStatus::Failed;
                OcrError::provider(ProviderStage::PollFailed, format!("status request failed: {e}"))
            })?;

        if !response.status().is_success() {
            job.status = JobStatus::Failed;
            return Err(OcrError::provider(
                ProviderStage::PollFailed,
                format!("unexpected status {}", response.status()),
            ));
        }

        let body: PollResponse = response.json().await.map_err(|e| {
            job.status = JobStatus::Failed;
            OcrError::provider(ProviderStage::PollFailed, format!("malformed status body: {e}"))
        })?;

        match body.status.as_str() {
            "succeeded" => {
                job.status = JobStatus::Succeeded;
                let result = body.analyze_result.unwrap_or(AnalyzeResult {
                    read_results: Vec::new(),
                });
                Ok(Some(output_from_analyze(result, &self.layout)))
            }
            "failed" => {
                job.status = JobStatus::Failed;
                Err(OcrError::provider(
                    ProviderStage::ProcessingFailed,
                    "provider reported the job as failed",
                ))
            }
            other => {
                debug!(
                    "Job still in flight (status '{other}', attempt {})",
                    job.attempts
                );
                job.status = JobStatus::Polling;
                Ok(None)
            }
        }
    }

    /// Submit an image and poll until a terminal state
    ///
    /// Polls once per configured interval, up to the attempt budget; running
    /// out of attempts times the job out.
    pub async fn extract(&self, image: &[u8]) -> Result<ProviderOutput, OcrError> {
        let mut job = self.submit(image).await?;

        while job.attempts < self.poll.max_attempts {
            sleep(self.poll.interval).await;
            if let Some(output) = self.poll_once(&mut job).await? {
                info!(
                    "Primary provider succeeded after {} poll attempts ({} chars)",
                    job.attempts,
                    output.text.len()
                );
                return Ok(output);
            }
        }

        job.status = JobStatus::TimedOut;
        warn!(
            "Primary provider job timed out after {} poll attempts",
            job.attempts
        );
        Err(OcrError::provider(
            ProviderStage::Timeout,
            format!("no terminal status after {} attempts", job.attempts),
        ))
    }
}

/// Normalize the provider's page/line structure into reading-ordered text
///
/// Each page is reconstructed independently; pages are joined with a blank
/// line. Line confidences arrive in 0–1 and are scaled to 0–100.
fn output_from_analyze(result: AnalyzeResult, layout: &LayoutConfig) -> ProviderOutput {
    let page_count = result.read_results.len() as u32;

    let mut all_lines: Vec<TextLine> = Vec::new();
    let mut pages: Vec<String> = Vec::new();

    for page in result.read_results {
        let lines: Vec<TextLine> = page
            .lines
            .into_iter()
            .map(|line| TextLine {
                content: line.text,
                x: line.bounding_box.first().copied().unwrap_or(0.0),
                y: line.bounding_box.get(1).copied().unwrap_or(0.0),
                width: line.bounding_box.get(2).copied().unwrap_or(0.0),
                height: line.bounding_box.get(3).copied().unwrap_or(0.0),
                confidence: line.confidence.unwrap_or(0.0) * 100.0,
            })
            .collect();

        all_lines.extend(lines.iter().cloned());
        pages.push(reconstruct_reading_order(lines, layout));
    }

    ProviderOutput {
        text: pages.join("\n\n"),
        confidence: average_confidence(&all_lines),
        page_count,
    }
}

#[async_trait]
impl OcrProvider for PrimaryClient {
    async fn recognize(&self, image: &[u8]) -> Result<ProviderOutput, OcrError> {
        self.extract(image).await
    }

    fn name(&self) -> &str {
        "primary-cloud"
    }
}
