// SPDX-License-Identifier: MIT
//! SQLite storage for progress records.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::storage::{now_ms, with_timeout};
use crate::tasks::TaskStatus;

use super::model::ProgressUpdate;

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    id: String,
    task_id: String,
    status: String,
    note: Option<String>,
    actor_id: String,
    created_at: i64,
}

impl TryFrom<ProgressRow> for ProgressUpdate {
    type Error = CoreError;

    fn try_from(r: ProgressRow) -> Result<ProgressUpdate> {
        let status = TaskStatus::parse(&r.status).ok_or_else(|| CoreError::NoNextStatus {
            status: r.status.clone(),
        })?;
        Ok(ProgressUpdate {
            id: r.id,
            task_id: r.task_id,
            status,
            note: r.note,
            actor_id: r.actor_id,
            created_at: r.created_at,
        })
    }
}

#[derive(Clone)]
pub struct ProgressStore {
    pool: SqlitePool,
}

impl ProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Full status history of a task, ascending by time.
    pub async fn history(&self, task_id: &str) -> Result<Vec<ProgressUpdate>> {
        let rows: Vec<ProgressRow> = with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM progress_updates WHERE task_id = ? ORDER BY created_at ASC",
            )
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;
        rows.into_iter().map(ProgressUpdate::try_from).collect()
    }

    /// Next server timestamp for a task's progress, nudged past the newest
    /// record so history order survives clock skew.
    pub(crate) async fn next_ts_tx(conn: &mut SqliteConnection, task_id: &str) -> Result<i64> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM progress_updates WHERE task_id = ?")
                .bind(task_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(now_ms().max(last.unwrap_or(0) + 1))
    }

    pub(crate) async fn append_tx(
        conn: &mut SqliteConnection,
        task_id: &str,
        status: TaskStatus,
        note: Option<&str>,
        actor_id: &str,
        at: i64,
    ) -> Result<ProgressUpdate> {
        let update = ProgressUpdate {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            status,
            note: note.map(str::to_string),
            actor_id: actor_id.to_string(),
            created_at: at,
        };
        sqlx::query(
            "INSERT INTO progress_updates (id, task_id, status, note, actor_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&update.id)
        .bind(&update.task_id)
        .bind(update.status.as_str())
        .bind(&update.note)
        .bind(&update.actor_id)
        .bind(update.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(update)
    }
}
