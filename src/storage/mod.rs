// SPDX-License-Identifier: MIT
//! SQLite-backed durable store.
//!
//! One pool, WAL journal, migration-driven schema. Every multi-row invariant
//! in the core (message + thread summary, progress update + task status, the
//! legacy mirror) is a single transaction on this pool — callers never issue
//! read-modify-write sequences of their own.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context as _, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Default timeout for individual SQLite queries.
/// Prevents a hung query from wedging the caller indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
pub(crate) async fn with_timeout<T, E>(
    fut: impl std::future::Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, E>
where
    E: From<sqlx::Error>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::from(sqlx::Error::PoolTimedOut)),
    }
}

/// Current epoch time in milliseconds. All persisted timestamps are
/// server-assigned through this function; client clocks are never trusted.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (or create) the database under `data_dir` and run migrations.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("gigd.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Capped at one connection so every
    /// query sees the same memory-backed store.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("failed to run database migrations")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply_cleanly() {
        let storage = Storage::in_memory().await.unwrap();
        // Spot-check a couple of tables exist.
        for table in ["tasks", "threads", "messages", "progress_updates"] {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&storage.pool())
                .await
                .unwrap();
            assert_eq!(n, 0);
        }
    }

    #[tokio::test]
    async fn on_disk_database_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let storage = Storage::new(dir.path()).await.unwrap();
            sqlx::query("INSERT INTO users (id, display_name, created_at) VALUES ('a', 'A', 1)")
                .execute(&storage.pool())
                .await
                .unwrap();
        }
        let storage = Storage::new(dir.path()).await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&storage.pool())
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn now_ms_has_millisecond_resolution() {
        let t = now_ms();
        assert!(t > 1_600_000_000_000); // after Sep 2020, in millis
    }
}
