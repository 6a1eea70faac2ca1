use crate::domain::errors::{DispatchError, DispatchResult};
use chrono::{DateTime, Utc};
use sqlx::{any::AnyPoolOptions, AnyPool};

mod call_store;
mod directory_store;

pub struct Database {
    pub(crate) pool: AnyPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        // Ensure drivers are installed for AnyPool
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(20)
            .min_connections(5)
            .connect(database_url)
            .await?;

        // Enable optimizations for SQLite
        if database_url.starts_with("sqlite") {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA busy_timeout = 5000")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA synchronous = NORMAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&pool)
                .await?;
        }

        Ok(Self { pool })
    }

    /// Idempotent DDL for every table this crate touches. Safe to run on
    /// every start; existing data is never dropped.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS calls (
                call_id TEXT PRIMARY KEY,
                caller_number TEXT NOT NULL,
                called_number TEXT NOT NULL,
                customer_id TEXT,
                agent_id TEXT,
                status TEXT NOT NULL,
                start_time TEXT NOT NULL,
                answer_time TEXT,
                end_time TEXT,
                queue_time INTEGER NOT NULL DEFAULT 0,
                talk_duration INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                recording_url TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_call_id TEXT,
                total_calls INTEGER NOT NULL DEFAULT 0,
                total_talk_time INTEGER NOT NULL DEFAULT 0,
                avg_handle_time REAL NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 1,
                last_activity TEXT NOT NULL,
                shift_start TEXT,
                shift_end TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS call_queue (
                call_id TEXT PRIMARY KEY,
                caller_number TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1,
                queue_position INTEGER NOT NULL,
                estimated_wait_time INTEGER NOT NULL DEFAULT 0,
                queued_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                cif_number TEXT,
                full_name TEXT NOT NULL,
                phone TEXT,
                segment TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                full_name TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calls_status ON calls(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calls_start_time ON calls(start_time)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(phone)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

/// Timestamps are stored as RFC 3339 TEXT so rows read the same across
/// SQLite and Postgres.
pub(crate) fn parse_timestamp(value: &str) -> DispatchResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| DispatchError::Upstream(format!("invalid timestamp '{}': {}", value, err)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
) -> DispatchResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}
