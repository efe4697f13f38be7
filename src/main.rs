use anyhow::{Context, Result};
use log::info;

use studyscan::config::{PipelineConfig, PrimaryProviderConfig, UnlimitedProviderConfig};
use studyscan::pipeline::OcrPipeline;
use studyscan::providers::local::LocalClient;
use studyscan::providers::primary::PrimaryClient;
use studyscan::providers::unlimited::UnlimitedClient;
use studyscan::usage_ledger::UsageLedger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let image_path = args.next().context("Usage: studyscan <image> <user-id> [--paid]")?;
    let user_id = args.next().context("Usage: studyscan <image> <user-id> [--paid]")?;
    let is_paid_user = args.next().as_deref() == Some("--paid");

    info!("Extracting text from {image_path} for user {user_id}");

    let image = std::fs::read(&image_path)
        .with_context(|| format!("Failed to read image file: {image_path}"))?;

    let ledger_path =
        std::env::var("LEDGER_PATH").unwrap_or_else(|_| "studyscan-usage.db".to_string());
    let config = PipelineConfig::default();
    let ledger = UsageLedger::open(&ledger_path, config.quota.clone())?;

    let mut pipeline = OcrPipeline::new(ledger, &config);

    if let Some(primary) = PrimaryProviderConfig::from_env() {
        pipeline = pipeline.with_primary(Box::new(PrimaryClient::new(
            primary,
            config.poll.clone(),
            config.layout.clone(),
        )));
    } else {
        info!("Primary provider not configured, serving through fallbacks only");
    }

    if let Some(unlimited) = UnlimitedProviderConfig::from_env() {
        pipeline = pipeline.with_unlimited(Box::new(UnlimitedClient::new(unlimited)));
    }

    pipeline = pipeline.with_local(Box::new(LocalClient::new()));

    let result = pipeline.extract_text(&image, &user_id, is_paid_user).await?;

    if result.is_fallback {
        info!(
            "Served by fallback provider {:?} (reason: {})",
            result.source,
            result.fallback_reason.as_deref().unwrap_or("unknown")
        );
    }

    println!("{}", result.text);

    let remaining = pipeline.remaining(&user_id, is_paid_user)?;
    info!(
        "Quota remaining for {user_id}: {} today, {} this month",
        remaining.daily_remaining, remaining.monthly_remaining
    );

    Ok(())
}
