// SPDX-License-Identifier: MIT
//! Notification creation and live delivery.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::identity::IdentityDirectory;
use crate::storage::{now_ms, with_timeout};

use super::model::{Notification, NotificationCategory};

/// Capacity of the broadcast channel. Slow consumers lag and skip old
/// events; the table remains the source of truth.
const BUS_CAPACITY: usize = 256;

/// Live notification stream event.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Created(Notification),
    Read { id: String, user_id: String },
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    category: String,
    title: String,
    body: String,
    task_id: Option<String>,
    is_read: i64,
    created_at: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = CoreError;

    fn try_from(r: NotificationRow) -> Result<Notification> {
        let category = NotificationCategory::parse(&r.category)
            .ok_or_else(|| CoreError::InvalidMessage(format!("bad category '{}'", r.category)))?;
        Ok(Notification {
            id: r.id,
            user_id: r.user_id,
            category,
            title: r.title,
            body: r.body,
            task_id: r.task_id,
            is_read: r.is_read != 0,
            created_at: r.created_at,
        })
    }
}

/// Creates notification records and broadcasts them to live subscribers.
#[derive(Clone)]
pub struct NotificationDispatcher {
    pool: SqlitePool,
    directory: Arc<dyn IdentityDirectory>,
    sender: broadcast::Sender<NotificationEvent>,
}

impl NotificationDispatcher {
    pub fn new(pool: SqlitePool, directory: Arc<dyn IdentityDirectory>) -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            pool,
            directory,
            sender,
        }
    }

    /// Subscribe to notifications created after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Create one notification. Fails with `InvalidRecipient` when the
    /// directory does not know the recipient; never deduplicates — callers
    /// own the exactly-once guarantee.
    pub async fn notify(
        &self,
        recipient: &str,
        category: NotificationCategory,
        title: &str,
        body: &str,
        task_ref: Option<&str>,
    ) -> Result<Notification> {
        if !self.directory.exists(recipient).await? {
            return Err(CoreError::InvalidRecipient(recipient.to_string()));
        }

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: recipient.to_string(),
            category,
            title: title.to_string(),
            body: body.to_string(),
            task_id: task_ref.map(str::to_string),
            is_read: false,
            created_at: now_ms(),
        };

        with_timeout(async {
            sqlx::query(
                "INSERT INTO notifications
                     (id, user_id, category, title, body, task_id, is_read, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(&notification.id)
            .bind(&notification.user_id)
            .bind(notification.category.as_str())
            .bind(&notification.title)
            .bind(&notification.body)
            .bind(&notification.task_id)
            .bind(notification.created_at)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;

        debug!(
            recipient,
            category = %notification.category,
            "notification created"
        );
        let _ = self.sender.send(NotificationEvent::Created(notification.clone()));
        Ok(notification)
    }

    /// All notifications for a user, ascending by creation time.
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at ASC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        with_timeout(async {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await
    }

    /// Flip the read flag. One-way; flipping an already-read notification is
    /// a no-op and emits nothing.
    pub async fn mark_read(&self, notification_id: &str) -> Result<()> {
        let res = with_timeout(async {
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND is_read = 0")
                .bind(notification_id)
                .execute(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;

        if res.rows_affected() == 1 {
            let user_id: String = sqlx::query_scalar(
                "SELECT user_id FROM notifications WHERE id = ?",
            )
            .bind(notification_id)
            .fetch_one(&self.pool)
            .await?;
            let _ = self.sender.send(NotificationEvent::Read {
                id: notification_id.to_string(),
                user_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SqliteDirectory;
    use crate::storage::Storage;

    async fn dispatcher() -> NotificationDispatcher {
        let s = Storage::in_memory().await.unwrap();
        let dir = SqliteDirectory::new(s.pool());
        dir.register("alice", "Alice").await.unwrap();
        NotificationDispatcher::new(s.pool(), Arc::new(dir))
    }

    #[tokio::test]
    async fn notify_creates_and_broadcasts() {
        let d = dispatcher().await;
        let mut rx = d.subscribe();

        let n = d
            .notify(
                "alice",
                NotificationCategory::Status,
                "Task Status Updated",
                "Your task \"Groceries\" is now Picked Up",
                Some("task-1"),
            )
            .await
            .unwrap();
        assert!(!n.is_read);

        match rx.recv().await.unwrap() {
            NotificationEvent::Created(got) => assert_eq!(got.id, n.id),
            other => panic!("unexpected event: {other:?}"),
        }

        let list = d.for_user("alice").await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(d.unread_count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_recipient_is_rejected() {
        let d = dispatcher().await;
        let err = d
            .notify("mallory", NotificationCategory::Message, "t", "b", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecipient(_)));
        // No record was created.
        assert_eq!(d.for_user("mallory").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn mark_read_flips_once() {
        let d = dispatcher().await;
        let n = d
            .notify("alice", NotificationCategory::Message, "New Message", "hi", None)
            .await
            .unwrap();

        d.mark_read(&n.id).await.unwrap();
        assert_eq!(d.unread_count("alice").await.unwrap(), 0);
        // Second flip is a no-op.
        d.mark_read(&n.id).await.unwrap();
        assert_eq!(d.unread_count("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_ascending() {
        let d = dispatcher().await;
        for i in 0..3 {
            d.notify(
                "alice",
                NotificationCategory::Message,
                &format!("m{i}"),
                "b",
                None,
            )
            .await
            .unwrap();
        }
        let list = d.for_user("alice").await.unwrap();
        assert!(list.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
