use crate::postgres;
use anyhow::{Context, Result};
use config::{Config, Environment, Map};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    #[serde(skip)]
    pub postgres: postgres::Settings,
}

impl Settings {
    /// Reads `PORT` and the `DB_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Same as [`Settings::from_env`] but reads from `vars` when given.
    pub fn load(vars: Option<Map<String, String>>) -> Result<Self> {
        let mut settings: Settings = Config::builder()
            .set_default("port", 3000)?
            .add_source(Environment::default().source(vars.clone()))
            .build()?
            .try_deserialize()
            .context("invalid PORT")?;

        settings.postgres = Config::builder()
            .set_default("host", "localhost")?
            .set_default("port", 5432)?
            .set_default("name", "test")?
            .set_default("user", "testuser")?
            .set_default("password", "password")?
            .set_default("max_connections", 20)?
            .set_default("idle_timeout_ms", 30_000)?
            .set_default("acquire_timeout_ms", 2_000)?
            .set_default("admin_database", "postgres")?
            .add_source(
                Environment::with_prefix("DB")
                    .prefix_separator("_")
                    .source(vars),
            )
            .build()?
            .try_deserialize()
            .context("invalid DB_* settings")?;

        Ok(settings)
    }
}
