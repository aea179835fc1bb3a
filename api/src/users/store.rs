use async_trait::async_trait;
use shared::User;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::postgres::{classify, DbErrorKind};

#[derive(Debug)]
pub enum StoreError {
    DuplicateEmail,
    Backend(anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match classify(&err) {
            DbErrorKind::UniqueViolation => Self::DuplicateEmail,
            _ => Self::Backend(err.into()),
        }
    }
}

/// Persistence for the `users` table.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Newest first, at most `limit` rows.
    async fn list_recent(&self, limit: i64) -> Result<Vec<User>, StoreError>;

    async fn find(&self, id: i32) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::DuplicateEmail`] when `email` is taken.
    async fn insert(&self, name: &str, email: &str) -> Result<User, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list_recent(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(user_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    async fn find(&self, id: i32) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row).transpose()?)
    }

    async fn insert(&self, name: &str, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (name, email)
            VALUES ($1, $2)
            RETURNING id, name, email, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(row)?)
    }
}
