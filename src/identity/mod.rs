// SPDX-License-Identifier: MIT
//! Identity directory seam.
//!
//! Authentication lives outside this core; callers hand us verified opaque
//! identity strings. The one thing the core needs from the identity system
//! is membership — the notification dispatcher refuses to address a
//! recipient the directory does not know.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{CoreError, Result};
use crate::storage::{now_ms, with_timeout};

/// Resolves opaque identity strings to known users.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn exists(&self, user_id: &str) -> Result<bool>;
}

/// Directory backed by the `users` table.
#[derive(Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a user. Idempotent — re-registering an existing id is a
    /// no-op.
    pub async fn register(&self, user_id: &str, display_name: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(CoreError::InvalidIdentity("user id is empty".into()));
        }
        with_timeout(async {
            sqlx::query(
                "INSERT OR IGNORE INTO users (id, display_name, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(display_name)
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for SqliteDirectory {
    async fn exists(&self, user_id: &str) -> Result<bool> {
        if user_id.is_empty() {
            return Ok(false);
        }
        let n: i64 = with_timeout(async {
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        Ok(n > 0)
    }
}

/// Directory that accepts every non-empty identity. For embedders that do
/// their own membership checks upstream.
pub struct OpenDirectory;

#[async_trait]
impl IdentityDirectory for OpenDirectory {
    async fn exists(&self, user_id: &str) -> Result<bool> {
        Ok(!user_id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[tokio::test]
    async fn register_and_lookup() {
        let s = Storage::in_memory().await.unwrap();
        let dir = SqliteDirectory::new(s.pool());
        dir.register("alice", "Alice A").await.unwrap();
        dir.register("alice", "Alice again").await.unwrap(); // idempotent

        assert!(dir.exists("alice").await.unwrap());
        assert!(!dir.exists("mallory").await.unwrap());
        assert!(!dir.exists("").await.unwrap());
    }
}
