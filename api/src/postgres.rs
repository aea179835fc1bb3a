use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, Executor, PgConnection, PgPool,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub idle_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
    pub admin_database: String,
}

impl Settings {
    fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
    }
}

/// The storage errors the application reacts to. Everything else is
/// an infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    DuplicateDatabase,
    UniqueViolation,
    Other,
}

const DUPLICATE_DATABASE: &str = "42P04";
const UNIQUE_VIOLATION: &str = "23505";

pub fn classify(err: &sqlx::Error) -> DbErrorKind {
    let sqlx::Error::Database(db_err) = err else {
        return DbErrorKind::Other;
    };
    kind_of_code(db_err.code().as_deref())
}

fn kind_of_code(code: Option<&str>) -> DbErrorKind {
    match code {
        Some(DUPLICATE_DATABASE) => DbErrorKind::DuplicateDatabase,
        Some(UNIQUE_VIOLATION) => DbErrorKind::UniqueViolation,
        _ => DbErrorKind::Other,
    }
}

const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        email VARCHAR(255) UNIQUE NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

const CREATE_TOUCH_FUNCTION: &str = r#"
    CREATE OR REPLACE FUNCTION update_updated_at_column()
    RETURNS TRIGGER AS $$
    BEGIN
        NEW.updated_at = CURRENT_TIMESTAMP;
        RETURN NEW;
    END;
    $$ LANGUAGE plpgsql
"#;

const INSTALL_TOUCH_TRIGGER: &str = r#"
    DROP TRIGGER IF EXISTS update_users_updated_at ON users;
    CREATE TRIGGER update_users_updated_at
        BEFORE UPDATE ON users
        FOR EACH ROW
        EXECUTE FUNCTION update_updated_at_column();
"#;

/// Brings the database up to a servable state and returns the pool.
/// Safe to run against a server that was already bootstrapped.
pub async fn bootstrap(settings: &Settings) -> Result<PgPool> {
    ensure_database(settings).await?;

    let pool = create_pool(settings).await?;
    apply_schema(&pool).await?;

    tracing::info!("Database setup completed for: {}", settings.name);
    tracing::info!("Connected to {}:{}", settings.host, settings.port);

    Ok(pool)
}

async fn ensure_database(settings: &Settings) -> Result<()> {
    let mut admin = PgConnection::connect_with(&settings.connect_options(&settings.admin_database))
        .await
        .with_context(|| {
            format!(
                "failed to connect to admin database {:?} at {}:{}",
                settings.admin_database, settings.host, settings.port
            )
        })?;

    // Identifiers cannot be bound as parameters.
    let create = format!("CREATE DATABASE {}", quote_identifier(&settings.name));
    match admin.execute(create.as_str()).await {
        Ok(_) => tracing::info!("Created database {}", settings.name),
        Err(e) if classify(&e) == DbErrorKind::DuplicateDatabase => {
            tracing::info!("Database already exists")
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to create database {:?}", settings.name))
        }
    }

    admin.close().await?;
    Ok(())
}

pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .idle_timeout(Duration::from_millis(settings.idle_timeout_ms))
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .connect_with(settings.connect_options(&settings.name))
        .await
        .with_context(|| format!("failed to open pool for {:?}", settings.name))?;

    Ok(pool)
}

async fn apply_schema(pool: &PgPool) -> Result<()> {
    pool.execute(CREATE_USERS_TABLE)
        .await
        .context("failed to create users table")?;
    pool.execute(CREATE_TOUCH_FUNCTION)
        .await
        .context("failed to create updated_at function")?;
    pool.execute(INSTALL_TOUCH_TRIGGER)
        .await
        .context("failed to install updated_at trigger")?;
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
