//! # Pipeline Tests Module
//!
//! Test suite for the fallback chain and orchestration facade: provider
//! ordering, quota-driven skipping, provenance tagging, usage recording,
//! and the single terminal failure case. Providers are stubbed through
//! the `OcrProvider` trait; the tokio clock is paused so rate-limit gaps
//! and poll delays cost no wall time.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use studyscan::config::{PipelineConfig, QuotaConfig};
    use studyscan::errors::{OcrError, ProviderStage};
    use studyscan::pipeline::{OcrPipeline, ProviderSource};
    use studyscan::providers::{OcrProvider, ProviderOutput};
    use studyscan::usage_ledger::UsageLedger;

    // Minimal PNG signature plus padding; enough for format detection
    fn png_bytes() -> Vec<u8> {
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0u8; 24]);
        bytes
    }

    struct StubProvider {
        name: &'static str,
        response: Result<ProviderOutput, OcrError>,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OcrProvider for StubProvider {
        async fn recognize(&self, _image: &[u8]) -> Result<ProviderOutput, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn succeeding(name: &'static str, text: &str) -> (Box<dyn OcrProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = StubProvider {
            name,
            response: Ok(ProviderOutput {
                text: text.to_string(),
                confidence: 95.0,
                page_count: 1,
            }),
            delay: None,
            calls: Arc::clone(&calls),
        };
        (Box::new(provider), calls)
    }

    fn slow_succeeding(
        name: &'static str,
        text: &str,
        delay: Duration,
    ) -> (Box<dyn OcrProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = StubProvider {
            name,
            response: Ok(ProviderOutput {
                text: text.to_string(),
                confidence: 95.0,
                page_count: 1,
            }),
            delay: Some(delay),
            calls: Arc::clone(&calls),
        };
        (Box::new(provider), calls)
    }

    fn failing(
        name: &'static str,
        stage: ProviderStage,
    ) -> (Box<dyn OcrProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = StubProvider {
            name,
            response: Err(OcrError::provider(stage, "stubbed failure")),
            delay: None,
            calls: Arc::clone(&calls),
        };
        (Box::new(provider), calls)
    }

    fn pipeline_with_quota(quota: QuotaConfig) -> OcrPipeline {
        let config = PipelineConfig {
            quota: quota.clone(),
            ..Default::default()
        };
        let ledger = UsageLedger::in_memory(quota).unwrap();
        OcrPipeline::new(ledger, &config)
    }

    fn default_pipeline() -> OcrPipeline {
        pipeline_with_quota(QuotaConfig::default())
    }

    /// Test the happy path: primary serves, no fallback marking
    #[tokio::test(start_paused = true)]
    async fn test_primary_success() {
        let (primary, _) = succeeding("primary", "2x + 3 = 7");
        let pipeline = default_pipeline().with_primary(primary);

        let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        assert_eq!(result.text, "2x + 3 = 7");
        assert_eq!(result.source, ProviderSource::Primary);
        assert!(!result.is_fallback);
        assert!(result.fallback_reason.is_none());
    }

    /// Test that a primary success is recorded against both quotas
    #[tokio::test(start_paused = true)]
    async fn test_primary_success_consumes_quota() {
        let (primary, _) = succeeding("primary", "text");
        let pipeline = default_pipeline().with_primary(primary);

        pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        let remaining = pipeline.remaining("user-1", false).unwrap();
        assert_eq!(remaining.daily_remaining, 4);
        assert_eq!(remaining.monthly_remaining, 4999);
    }

    /// Test that an exhausted monthly quota never invokes the primary
    #[tokio::test(start_paused = true)]
    async fn test_monthly_exhausted_skips_primary() {
        let (primary, primary_calls) = succeeding("primary", "never served");
        let (unlimited, _) = succeeding("unlimited", "fallback text");
        let pipeline = pipeline_with_quota(QuotaConfig {
            monthly_cap: 0,
            ..Default::default()
        })
        .with_primary(primary)
        .with_unlimited(unlimited);

        let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.source, ProviderSource::Unlimited);
        assert!(result.is_fallback);
        assert_eq!(result.fallback_reason.as_deref(), Some("monthly_exhausted"));
    }

    /// Test the 6th call of a free user's day falls back with daily_exhausted
    #[tokio::test(start_paused = true)]
    async fn test_daily_exhausted_falls_back() {
        let (primary, primary_calls) = succeeding("primary", "primary text");
        let (unlimited, _) = succeeding("unlimited", "fallback text");
        let pipeline = default_pipeline().with_primary(primary).with_unlimited(unlimited);

        for _ in 0..5 {
            let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();
            assert_eq!(result.source, ProviderSource::Primary);
        }

        let sixth = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();
        assert_eq!(primary_calls.load(Ordering::SeqCst), 5);
        assert_eq!(sixth.source, ProviderSource::Unlimited);
        assert_eq!(sixth.fallback_reason.as_deref(), Some("daily_exhausted"));
    }

    /// Test that a primary timeout becomes a successful fallback, not an error
    #[tokio::test(start_paused = true)]
    async fn test_primary_timeout_recovered_by_fallback() {
        let (primary, _) = failing("primary", ProviderStage::Timeout);
        let (unlimited, _) = succeeding("unlimited", "recovered");
        let pipeline = default_pipeline().with_primary(primary).with_unlimited(unlimited);

        let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        assert_eq!(result.source, ProviderSource::Unlimited);
        assert_eq!(result.fallback_reason.as_deref(), Some("timeout"));
    }

    /// Test that a failed primary attempt consumes no quota
    #[tokio::test(start_paused = true)]
    async fn test_failed_primary_not_counted() {
        let (primary, _) = failing("primary", ProviderStage::ProcessingFailed);
        let (unlimited, _) = succeeding("unlimited", "recovered");
        let pipeline = default_pipeline().with_primary(primary).with_unlimited(unlimited);

        pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        let remaining = pipeline.remaining("user-1", false).unwrap();
        assert_eq!(remaining.daily_remaining, 5);
        assert_eq!(remaining.monthly_remaining, 5000);
    }

    /// Test the chain reaches the local provider with an escalated reason
    #[tokio::test(start_paused = true)]
    async fn test_chain_escalates_to_local() {
        let (primary, _) = failing("primary", ProviderStage::SubmissionFailed);
        let (unlimited, _) = failing("unlimited", ProviderStage::SubmissionFailed);
        let (local, _) = succeeding("local", "offline text");
        let pipeline = default_pipeline()
            .with_primary(primary)
            .with_unlimited(unlimited)
            .with_local(local);

        let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        assert_eq!(result.source, ProviderSource::Local);
        assert!(result.is_fallback);
        let reason = result.fallback_reason.unwrap();
        assert!(reason.contains("submission_failed"), "reason: {reason}");
    }

    /// Test that fallback ordering is fixed: unlimited before local
    #[tokio::test(start_paused = true)]
    async fn test_unlimited_preferred_over_local() {
        let (primary, _) = failing("primary", ProviderStage::Timeout);
        let (unlimited, _) = succeeding("unlimited", "from unlimited");
        let (local, local_calls) = succeeding("local", "from local");
        let pipeline = default_pipeline()
            .with_primary(primary)
            .with_unlimited(unlimited)
            .with_local(local);

        let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        assert_eq!(result.source, ProviderSource::Unlimited);
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    /// Test that all providers failing surfaces the three reasons
    #[tokio::test(start_paused = true)]
    async fn test_all_providers_exhausted() {
        let (primary, _) = failing("primary", ProviderStage::Timeout);
        let (unlimited, _) = failing("unlimited", ProviderStage::SubmissionFailed);
        let (local, _) = failing("local", ProviderStage::ProcessingFailed);
        let pipeline = default_pipeline()
            .with_primary(primary)
            .with_unlimited(unlimited)
            .with_local(local);

        let err = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap_err();

        match err {
            OcrError::AllProvidersExhausted { reasons } => {
                assert_eq!(reasons[0], "timeout");
                assert_eq!(reasons[1], "submission_failed");
                assert_eq!(reasons[2], "processing_failed");
            }
            other => panic!("expected AllProvidersExhausted, got {other:?}"),
        }
    }

    /// Test that a pipeline with no providers at all is exhausted immediately
    #[tokio::test(start_paused = true)]
    async fn test_no_providers_configured() {
        let pipeline = default_pipeline();

        let err = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap_err();

        match err {
            OcrError::AllProvidersExhausted { reasons } => {
                assert_eq!(reasons[0], "primary_unconfigured");
                assert_eq!(reasons[1], "unlimited_unconfigured");
                assert_eq!(reasons[2], "local_unconfigured");
            }
            other => panic!("expected AllProvidersExhausted, got {other:?}"),
        }
    }

    /// Test that an empty payload is rejected before any provider runs
    #[tokio::test(start_paused = true)]
    async fn test_empty_image_rejected() {
        let (primary, primary_calls) = succeeding("primary", "text");
        let pipeline = default_pipeline().with_primary(primary);

        let err = pipeline.extract_text(&[], "user-1", false).await.unwrap_err();

        assert!(matches!(err, OcrError::Validation(_)));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);

        // Rejected payloads consume no quota
        let remaining = pipeline.remaining("user-1", false).unwrap();
        assert_eq!(remaining.daily_remaining, 5);
    }

    /// Test that unrecognizable bytes are rejected as an invalid image
    #[tokio::test(start_paused = true)]
    async fn test_unknown_format_rejected() {
        let pipeline = default_pipeline();
        let err = pipeline
            .extract_text(&[0x00; 32], "user-1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Validation(_)));
    }

    /// Test that concurrent requests cannot both pass a near-cap quota check
    ///
    /// The reservation counts the call when it is admitted, so a second
    /// request arriving while the first is still in flight must fall back
    /// rather than overshoot the cap.
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_never_exceed_monthly_cap() {
        let (primary, primary_calls) =
            slow_succeeding("primary", "primary text", Duration::from_secs(5));
        let (unlimited, _) = succeeding("unlimited", "fallback text");
        let pipeline = Arc::new(
            pipeline_with_quota(QuotaConfig {
                monthly_cap: 1,
                ..Default::default()
            })
            .with_primary(primary)
            .with_unlimited(unlimited),
        );

        let image = png_bytes();
        let handles: Vec<_> = ["user-1", "user-2"]
            .into_iter()
            .map(|user| {
                let pipeline = Arc::clone(&pipeline);
                let image = image.clone();
                tokio::spawn(async move { pipeline.extract_text(&image, user, false).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);

        let primary_served = results
            .iter()
            .filter(|r| r.source == ProviderSource::Primary)
            .count();
        assert_eq!(primary_served, 1);

        let fallback = results.iter().find(|r| r.is_fallback).unwrap();
        assert_eq!(fallback.source, ProviderSource::Unlimited);
        assert_eq!(fallback.fallback_reason.as_deref(), Some("monthly_exhausted"));
    }

    /// Test that the sanitizer runs on fallback results too
    #[tokio::test(start_paused = true)]
    async fn test_sanitizer_applied_to_fallback_result() {
        let (unlimited, _) = succeeding(
            "unlimited",
            "The answer is 4\n\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}",
        );
        let pipeline = default_pipeline().with_unlimited(unlimited);

        let result = pipeline.extract_text(&png_bytes(), "user-1", false).await.unwrap();

        assert_eq!(result.text, "The answer is 4");
    }
}
