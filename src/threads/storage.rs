// SPDX-License-Identifier: MIT
//! SQLite storage for threads.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{CoreError, Result};
use crate::storage::with_timeout;

use super::model::ChatThread;

// ─── Raw DB row ──────────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ThreadRow {
    id: String,
    user_a: String,
    user_b: String,
    task_id: Option<String>,
    last_message: Option<String>,
    last_sender: Option<String>,
    last_message_at: Option<i64>,
    created_at: i64,
}

impl From<ThreadRow> for ChatThread {
    fn from(r: ThreadRow) -> ChatThread {
        ChatThread {
            id: r.id,
            user_a: r.user_a,
            user_b: r.user_b,
            task_id: r.task_id,
            last_message: r.last_message,
            last_sender: r.last_sender,
            last_message_at: r.last_message_at,
            created_at: r.created_at,
        }
    }
}

// ─── ThreadStorage ───────────────────────────────────────────────────────────

/// Read side of the thread collection plus the transaction-scoped summary
/// bump the message store composes into its append transaction.
#[derive(Clone)]
pub struct ThreadStorage {
    pool: SqlitePool,
}

impl ThreadStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, thread_id: &str) -> Result<ChatThread> {
        let row: Option<ThreadRow> = with_timeout(async {
            sqlx::query_as("SELECT * FROM threads WHERE id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        row.map(ChatThread::from)
            .ok_or_else(|| CoreError::not_found("thread", thread_id))
    }

    /// The thread bound to `task_id`, if any. Bindings are first-write-wins,
    /// so at most one row matches.
    pub async fn for_task(&self, task_id: &str) -> Result<Option<ChatThread>> {
        let row: Option<ThreadRow> = with_timeout(async {
            sqlx::query_as("SELECT * FROM threads WHERE task_id = ? LIMIT 1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        Ok(row.map(ChatThread::from))
    }

    /// The thread of a participant pair, if the two have ever talked.
    pub async fn for_pair(&self, a: &str, b: &str) -> Result<Option<ChatThread>> {
        let (user_a, user_b) = crate::threads::pair_key(a, b)?;
        let row: Option<ThreadRow> = with_timeout(async {
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

    /// Every thread `user_id` participates in, most recently active first.
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<ChatThread>> {
        let rows: Vec<ThreadRow> = with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM threads
                 WHERE user_a = ? OR user_b = ?
                 ORDER BY COALESCE(last_message_at, created_at) DESC",
            )
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;
        Ok(rows.into_iter().map(ChatThread::from).collect())
    }

    /// Bump the denormalized last-message summary. Runs inside the message
    /// append transaction so readers never see a message without its summary.
    pub(crate) async fn bump_summary_tx(
        conn: &mut SqliteConnection,
        thread_id: &str,
        preview: &str,
        sender_id: &str,
        at: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE threads
             SET last_message = ?, last_sender = ?, last_message_at = ?
             WHERE id = ?",
        )
        .bind(preview)
        .bind(sender_id)
        .bind(at)
        .bind(thread_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
