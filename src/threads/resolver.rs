// SPDX-License-Identifier: MIT
//! Thread resolution — one thread per unordered participant pair.
//!
//! The hazard here is concurrent first contact: both parties message each
//! other at the same instant and neither sees an existing thread. Resolution
//! is therefore a conditional create on the sorted-pair unique key
//! (`INSERT .. ON CONFLICT DO NOTHING`), never a read-then-write sequence;
//! whichever insert loses simply reads back the winner's row.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::storage::{now_ms, with_timeout};

use super::model::{pair_key, ChatThread};

#[derive(Clone)]
pub struct ThreadResolver {
    pool: SqlitePool,
}

impl ThreadResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve the canonical thread for `{a, b}`, creating it if absent.
    ///
    /// When `task_ref` is supplied and the thread has no task bound yet, the
    /// association is set first-write-wins; a later call with a different
    /// task never overwrites it.
    pub async fn resolve(&self, a: &str, b: &str, task_ref: Option<&str>) -> Result<ChatThread> {
        let (user_a, user_b) = pair_key(a, b)?;
        let candidate_id = Uuid::new_v4().to_string();
        let now = now_ms();

        with_timeout(async {
            sqlx::query(
                "INSERT INTO threads (id, user_a, user_b, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(user_a, user_b) DO NOTHING",
            )
            .bind(&candidate_id)
            .bind(user_a)
            .bind(user_b)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;

        if let Some(task_id) = task_ref {
            // First-write-wins: only lands while task_id is still NULL.
            with_timeout(async {
                sqlx::query(
                    "UPDATE threads SET task_id = ?
                     WHERE user_a = ? AND user_b = ? AND task_id IS NULL",
                )
                .bind(task_id)
                .bind(user_a)
                .bind(user_b)
                .execute(&self.pool)
                .await
                .map_err(CoreError::from)
            })
            .await?;
        }

        let row = self.lookup(user_a, user_b).await?.ok_or_else(|| {
            // The insert either created or conflicted with this key; a miss
            // here means the backend dropped the row under us.
            CoreError::not_found("thread", format!("{user_a}/{user_b}"))
        })?;

        if row.id == candidate_id {
            debug!(thread_id = %row.id, user_a, user_b, "thread created");
        }
        Ok(row)
    }

    async fn lookup(&self, user_a: &str, user_b: &str) -> Result<Option<ChatThread>> {
        let row: Option<super::storage::ThreadRow> = with_timeout(async {
            sqlx::query_as("SELECT * FROM threads WHERE user_a = ? AND user_b = ?")
                .bind(user_a)
                .bind(user_b)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        Ok(row.map(ChatThread::from))
    }
}
