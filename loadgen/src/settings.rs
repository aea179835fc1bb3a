use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, Map};
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_host: String,
    #[serde(rename = "loadgen_vus")]
    pub vus: usize,
    #[serde(rename = "loadgen_pause_ms")]
    pub pause_ms: u64,
    #[serde(rename = "loadgen_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(rename = "loadgen_graceful_stop_ms")]
    pub graceful_stop_ms: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn load(vars: Option<Map<String, String>>) -> Result<Self> {
        let mut settings: Settings = Config::builder()
            .set_default("api_host", "http://localhost:3000")?
            .set_default("loadgen_vus", 10)?
            .set_default("loadgen_pause_ms", 1_000)?
            .set_default("loadgen_request_timeout_ms", 60_000)?
            .set_default("loadgen_graceful_stop_ms", 30_000)?
            .add_source(Environment::default().source(vars))
            .build()?
            .try_deserialize()
            .context("invalid load generator settings")?;

        settings.api_host = settings.api_host.trim_end_matches('/').to_string();
        Url::parse(&settings.api_host)
            .with_context(|| format!("API_HOST {:?} is not a valid URL", settings.api_host))?;

        Ok(settings)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_millis(self.graceful_stop_ms)
    }
}
