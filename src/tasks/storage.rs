// SPDX-License-Identifier: MIT
//! SQLite repository for task records.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::storage::{now_ms, with_timeout};

use super::model::{Task, TaskStatus};

// ─── Raw DB row ──────────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    price: f64,
    status: String,
    created_by: String,
    accepted_by: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(r: TaskRow) -> Result<Task> {
        // Reject documents with unknown status values at the store boundary
        // instead of trusting loosely-typed rows.
        let status = TaskStatus::parse(&r.status)
            .ok_or_else(|| CoreError::NoNextStatus {
                status: r.status.clone(),
            })?;
        Ok(Task {
            id: r.id,
            title: r.title,
            description: r.description,
            price: r.price,
            status,
            created_by: r.created_by,
            accepted_by: r.accepted_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
            completed_at: r.completed_at,
        })
    }
}

// ─── TaskStorage ─────────────────────────────────────────────────────────────

/// Repository for the task slice this core owns: creation, lookup, and the
/// conditional writes the progress tracker composes into its transactions.
#[derive(Clone)]
pub struct TaskStorage {
    pool: SqlitePool,
}

impl TaskStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an open task. The performer is unassigned by definition.
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        price: f64,
        created_by: &str,
    ) -> Result<Task> {
        if created_by.is_empty() {
            return Err(CoreError::InvalidIdentity("creator is empty".into()));
        }
        if !(price > 0.0) {
            return Err(CoreError::InvalidTask(format!(
                "price must be positive, got {price}"
            )));
        }
        let id = Uuid::new_v4().to_string();
        let now = now_ms();

        with_timeout(async {
            sqlx::query(
                "INSERT INTO tasks (id, title, description, price, status, created_by,
                                    created_at, updated_at)
                 VALUES (?, ?, ?, ?, 'open', ?, ?, ?)",
            )
            .bind(&id)
            .bind(title)
            .bind(description)
            .bind(price)
            .bind(created_by)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;

        self.get(&id).await
    }

    pub async fn get(&self, task_id: &str) -> Result<Task> {
        let row: Option<TaskRow> = with_timeout(async {
            sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;

        row.ok_or_else(|| CoreError::not_found("task", task_id))?
            .try_into()
    }

    // ── Transaction-scoped helpers ───────────────────────────────────────────
    // Used by the progress tracker so the status write and the progress
    // append commit or roll back together.

    pub(crate) async fn fetch_tx(conn: &mut SqliteConnection, task_id: &str) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&mut *conn)
            .await?;
        row.ok_or_else(|| CoreError::not_found("task", task_id))?
            .try_into()
    }

    /// Move a task to `status`, guarded by the expected current status so a
    /// retried or racing transition applies at most once. Returns whether the
    /// write landed.
    pub(crate) async fn apply_status_tx(
        conn: &mut SqliteConnection,
        task_id: &str,
        expected: TaskStatus,
        status: TaskStatus,
        now: i64,
    ) -> Result<bool> {
        let completed_at = (status == TaskStatus::Completed).then_some(now);
        let res = sqlx::query(
            "UPDATE tasks
             SET status = ?, updated_at = ?,
                 completed_at = COALESCE(?, completed_at)
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(completed_at)
        .bind(task_id)
        .bind(expected.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Assign the performer on acceptance. Conditional on the task still
    /// being open and unclaimed, so of two concurrent acceptors exactly one
    /// wins.
    pub(crate) async fn claim_tx(
        conn: &mut SqliteConnection,
        task_id: &str,
        performer: &str,
        now: i64,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE tasks
             SET status = 'accepted', accepted_by = ?, updated_at = ?
             WHERE id = ? AND status = 'open' AND accepted_by IS NULL",
        )
        .bind(performer)
        .bind(now)
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn storage() -> TaskStorage {
        let s = Storage::in_memory().await.unwrap();
        TaskStorage::new(s.pool())
    }

    #[tokio::test]
    async fn create_starts_open_and_unassigned() {
        let tasks = storage().await;
        let t = tasks.create("Groceries", "2 bags", 15.0, "alice").await.unwrap();
        assert_eq!(t.status, TaskStatus::Open);
        assert!(t.accepted_by.is_none());
        assert!(t.completed_at.is_none());

        let fetched = tasks.get(&t.id).await.unwrap();
        assert_eq!(fetched.title, "Groceries");
    }

    #[tokio::test]
    async fn rejects_nonpositive_price() {
        let tasks = storage().await;
        let err = tasks.create("x", "", 0.0, "alice").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTask(_)));
        let err = tasks.create("x", "", -3.0, "alice").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTask(_)));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let tasks = storage().await;
        let err = tasks.get("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn claim_is_first_writer_wins() {
        let tasks = storage().await;
        let t = tasks.create("Ride", "", 20.0, "alice").await.unwrap();

        let mut conn = tasks.pool.acquire().await.unwrap();
        let now = now_ms();
        assert!(TaskStorage::claim_tx(&mut conn, &t.id, "bob", now).await.unwrap());
        assert!(!TaskStorage::claim_tx(&mut conn, &t.id, "carol", now).await.unwrap());
        // Release the single pooled connection so `get` can acquire it.
        drop(conn);

        let t = tasks.get(&t.id).await.unwrap();
        assert_eq!(t.accepted_by.as_deref(), Some("bob"));
        assert_eq!(t.status, TaskStatus::Accepted);
    }
}
