mod metrics;
mod profile;
mod runner;
mod scenario;
mod settings;
mod thresholds;

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use metrics::Metrics;
use profile::Profile;
use runner::Runner;
use scenario::Scenario;
use settings::Settings;
use thresholds::Thresholds;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit status when the run completed but crossed a threshold.
const THRESHOLDS_CROSSED: u8 = 99;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let client = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()?;
    let scenario = Scenario::new(client, &settings.api_host, Arc::new(Metrics::default()));

    let summary = Runner::new(Profile::ramp_hold_ramp(settings.vus), scenario)
        .pause(settings.pause())
        .graceful_stop(settings.graceful_stop())
        .run()
        .await;
    summary.log();

    let verdict = Thresholds::default().evaluate(&summary);
    if verdict.passed() {
        info!("All thresholds passed");
        return Ok(ExitCode::SUCCESS);
    }
    for breach in &verdict.breaches {
        error!("Threshold crossed: {}", breach);
    }
    Ok(ExitCode::from(THRESHOLDS_CROSSED))
}
