// SPDX-License-Identifier: MIT
//! Transactional message persistence.
//!
//! Every append commits the message row, the thread summary bump and the
//! legacy per-task mirror in one transaction, then emits to the live bus and
//! notifies the recipient. Timestamps are server-assigned and strictly
//! monotonic per thread.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::attachments::{AttachmentHandle, AttachmentStore};
use crate::error::{CoreError, Result};
use crate::notify::{NotificationCategory, NotificationDispatcher};
use crate::retry::{retry_transient, retry_with_backoff, RetryConfig};
use crate::storage::{now_ms, with_timeout};
use crate::tasks::TaskStatus;
use crate::threads::storage::{ThreadRow, ThreadStorage};
use crate::threads::ChatThread;

use super::events::{MessageBus, MessageEvent};
use super::model::{toggle_reaction_entry, Message, MessageDraft, MessageKind};

/// Preview shown in thread summaries and notifications when a message has no
/// text.
const ATTACHMENT_PREVIEW: &str = "Sent an attachment";

/// Result of an append: the stored message plus whether this call created it.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub message: Message,
    /// False when the client key matched an existing row. A replayed append
    /// bumps no summary, emits no event and notifies nobody.
    pub created: bool,
}

/// Result of a [`MessageStore::send`] that may have degraded to text-only.
#[derive(Debug)]
pub struct SendOutcome {
    pub message: Message,
    /// Set when the attachment upload failed and the send fell back to the
    /// text portion of the draft.
    pub attachment_error: Option<CoreError>,
}

// ─── Raw DB row ──────────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    thread_id: String,
    client_key: String,
    sender_id: String,
    recipient_id: Option<String>,
    content: String,
    attachment_url: Option<String>,
    kind: String,
    status_value: Option<String>,
    is_read: i64,
    reactions: String,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = CoreError;

    fn try_from(r: MessageRow) -> Result<Message> {
        let kind = MessageKind::parse(&r.kind)
            .ok_or_else(|| CoreError::InvalidMessage(format!("bad message kind '{}'", r.kind)))?;
        Ok(Message {
            id: r.id,
            thread_id: r.thread_id,
            client_key: r.client_key,
            sender_id: r.sender_id,
            recipient_id: r.recipient_id,
            content: r.content,
            attachment_url: r.attachment_url,
            kind,
            status_value: r.status_value,
            is_read: r.is_read != 0,
            reactions: serde_json::from_str(&r.reactions).unwrap_or_default(),
            created_at: r.created_at,
        })
    }
}

// ─── MessageStore ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
    bus: MessageBus,
    dispatcher: NotificationDispatcher,
    /// Mirror messages of task-bound threads into the legacy per-task table.
    mirror_task_messages: bool,
    /// Backoff for post-commit notification delivery.
    retry: RetryConfig,
}

impl MessageStore {
    pub fn new(
        pool: SqlitePool,
        dispatcher: NotificationDispatcher,
        mirror_task_messages: bool,
    ) -> Self {
        Self {
            pool,
            bus: MessageBus::new(),
            dispatcher,
            mirror_task_messages,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Receive message events emitted after this call. Pair with
    /// [`MessageStore::snapshot`] for full thread state.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MessageEvent> {
        self.bus.subscribe()
    }

    /// Append a message to a thread.
    ///
    /// The sender must be one of the thread's two participants; the recipient
    /// is derived, never caller-supplied. Replays of the same client key
    /// resolve to the existing row with `created == false`.
    pub async fn append(&self, thread_id: &str, draft: &MessageDraft) -> Result<AppendOutcome> {
        draft.validate()?;

        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        let thread = fetch_thread_tx(&mut tx, thread_id).await?;
        let recipient = thread
            .counterpart(&draft.sender_id)
            .ok_or_else(|| {
                CoreError::InvalidIdentity(format!(
                    "'{}' is not a participant of thread {thread_id}",
                    draft.sender_id
                ))
            })?
            .to_string();

        let ts = next_ts_tx(&mut tx, thread_id).await?;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            client_key: draft.client_key.clone(),
            sender_id: draft.sender_id.clone(),
            recipient_id: Some(recipient.clone()),
            content: draft.content.clone(),
            attachment_url: draft.attachment.as_ref().map(|h| h.0.clone()),
            kind: draft.kind(),
            status_value: None,
            is_read: false,
            reactions: Default::default(),
            created_at: ts,
        };

        if !insert_message_tx(&mut tx, &message).await? {
            // Replayed client key. Return the original row untouched.
            let existing: MessageRow =
                sqlx::query_as("SELECT * FROM messages WHERE client_key = ?")
                    .bind(&draft.client_key)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.commit().await.map_err(CoreError::from)?;
            debug!(thread_id, client_key = %draft.client_key, "duplicate append ignored");
            return Ok(AppendOutcome {
                message: existing.try_into()?,
                created: false,
            });
        }

        let preview = preview_of(&message);
        ThreadStorage::bump_summary_tx(&mut tx, thread_id, preview, &message.sender_id, ts)
            .await?;
        if self.mirror_task_messages {
            if let Some(task_id) = &thread.task_id {
                mirror_message_tx(&mut tx, task_id, &message).await?;
            }
        }
        tx.commit().await.map_err(CoreError::from)?;

        self.bus.emit(MessageEvent::Appended(message.clone()));
        // The message is committed either way; transient delivery failures
        // are retried with backoff so the one notification this append owes
        // is not silently dropped.
        let delivery = retry_transient(&self.retry, || {
            self.dispatcher.notify(
                &recipient,
                NotificationCategory::Message,
                "New Message",
                preview,
                thread.task_id.as_deref(),
            )
        })
        .await;
        if let Err(e) = delivery {
            warn!(thread_id, recipient = %recipient, err = %e, "message notification failed");
        }

        Ok(AppendOutcome {
            message,
            created: true,
        })
    }

    /// Upload-then-append. On upload failure a draft that also carries text
    /// degrades to a text-only message; an attachment-only draft fails
    /// without persisting anything.
    pub async fn send(
        &self,
        thread_id: &str,
        draft: MessageDraft,
        payload: Option<(&str, &[u8])>,
        attachments: &dyn AttachmentStore,
        retry: &RetryConfig,
    ) -> Result<SendOutcome> {
        let (draft, attachment_error) = match payload {
            None => (draft, None),
            Some((file_name, bytes)) => {
                match retry_with_backoff(retry, || attachments.upload(file_name, bytes)).await {
                    Ok(handle) => (draft.with_attachment(handle), None),
                    Err(e) if draft.content.trim().is_empty() => return Err(e),
                    Err(e) => {
                        warn!(thread_id, err = %e, "attachment upload failed, sending text only");
                        (draft, Some(e))
                    }
                }
            }
        };

        let outcome = self.append(thread_id, &draft).await?;
        Ok(SendOutcome {
            message: outcome.message,
            attachment_error,
        })
    }

    /// All messages of a thread, ascending by creation time.
    pub async fn snapshot(&self, thread_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM messages WHERE thread_id = ? ORDER BY created_at ASC",
            )
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    pub async fn get(&self, message_id: &str) -> Result<Message> {
        let row: Option<MessageRow> = with_timeout(async {
            sqlx::query_as("SELECT * FROM messages WHERE id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        row.ok_or_else(|| CoreError::not_found("message", message_id))?
            .try_into()
    }

    /// Flip the read receipt. One-way; re-reading an already-read message is
    /// a no-op and emits nothing.
    pub async fn mark_read(&self, message_id: &str) -> Result<()> {
        let res = with_timeout(async {
            sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ? AND is_read = 0")
                .bind(message_id)
                .execute(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;

        if res.rows_affected() == 1 {
            let message = self.get(message_id).await?;
            self.bus.emit(MessageEvent::Updated(message));
        }
        Ok(())
    }

    /// Toggle `user_id`'s reaction: same emoji removes it, a different one
    /// replaces it. Returns the updated message.
    pub async fn toggle_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<Message> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut message: Message = row
            .ok_or_else(|| CoreError::not_found("message", message_id))?
            .try_into()?;

        toggle_reaction_entry(&mut message.reactions, user_id, emoji);
        let encoded = serde_json::to_string(&message.reactions)
            .map_err(|e| CoreError::InvalidMessage(e.to_string()))?;
        sqlx::query("UPDATE messages SET reactions = ? WHERE id = ?")
            .bind(&encoded)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await.map_err(CoreError::from)?;

        self.bus.emit(MessageEvent::Updated(message.clone()));
        Ok(message)
    }

    /// Attach an uploaded blob to an existing message. A message holds at
    /// most one attachment; a second attach fails.
    pub async fn set_attachment(
        &self,
        message_id: &str,
        handle: &AttachmentHandle,
    ) -> Result<Message> {
        let res = with_timeout(async {
            sqlx::query(
                "UPDATE messages SET attachment_url = ? WHERE id = ? AND attachment_url IS NULL",
            )
            .bind(&handle.0)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)
        })
        .await?;

        if res.rows_affected() == 0 {
            // Distinguish a missing row from an already-attached one.
            let existing = self.get(message_id).await?;
            return Err(CoreError::InvalidMessage(format!(
                "message {} already has an attachment",
                existing.id
            )));
        }

        let message = self.get(message_id).await?;
        self.bus.emit(MessageEvent::Updated(message.clone()));
        Ok(message)
    }

    pub(crate) fn mirrors_task_messages(&self) -> bool {
        self.mirror_task_messages
    }

    /// Write a status-update mirror message inside an already-open progress
    /// transaction. Deduplicated on its derived client key; bumps no thread
    /// summary and sends no notification (the status notification covers it).
    pub(crate) async fn append_status_message_tx(
        conn: &mut SqliteConnection,
        thread: &ChatThread,
        task_id: &str,
        actor_id: &str,
        status: TaskStatus,
        ts: i64,
        mirror_task_messages: bool,
    ) -> Result<Message> {
        let recipient = thread.counterpart(actor_id).map(str::to_string);
        let message = Message {
            id: Uuid::new_v4().to_string(),
            thread_id: thread.id.clone(),
            client_key: format!("status:{task_id}:{}:{ts}", status.as_str()),
            sender_id: actor_id.to_string(),
            recipient_id: recipient,
            content: format!("Status updated to: {}", status.label()),
            attachment_url: None,
            kind: MessageKind::StatusUpdate,
            status_value: Some(status.as_str().to_string()),
            is_read: false,
            reactions: Default::default(),
            created_at: ts,
        };
        insert_message_tx(conn, &message).await?;
        if mirror_task_messages {
            mirror_message_tx(conn, task_id, &message).await?;
        }
        Ok(message)
    }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

async fn fetch_thread_tx(conn: &mut SqliteConnection, thread_id: &str) -> Result<ChatThread> {
    let row: Option<ThreadRow> = sqlx::query_as("SELECT * FROM threads WHERE id = ?")
        .bind(thread_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(ChatThread::from)
        .ok_or_else(|| CoreError::not_found("thread", thread_id))
}

/// Next server timestamp for a thread: wall clock, nudged forward past the
/// newest stored message so ordering survives clock skew. The progress
/// tracker folds this into its transition timestamp so status mirrors never
/// sort behind existing chat.
pub(crate) async fn next_ts_tx(conn: &mut SqliteConnection, thread_id: &str) -> Result<i64> {
    let last: Option<i64> =
        sqlx::query_scalar("SELECT MAX(created_at) FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(now_ms().max(last.unwrap_or(0) + 1))
}

/// Idempotent insert keyed on `client_key`. Returns false when the key
/// already exists.
async fn insert_message_tx(conn: &mut SqliteConnection, m: &Message) -> Result<bool> {
    let reactions = serde_json::to_string(&m.reactions)
        .map_err(|e| CoreError::InvalidMessage(e.to_string()))?;
    let res = sqlx::query(
        "INSERT OR IGNORE INTO messages
             (id, thread_id, client_key, sender_id, recipient_id, content,
              attachment_url, kind, status_value, is_read, reactions, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&m.id)
    .bind(&m.thread_id)
    .bind(&m.client_key)
    .bind(&m.sender_id)
    .bind(&m.recipient_id)
    .bind(&m.content)
    .bind(&m.attachment_url)
    .bind(m.kind.as_str())
    .bind(&m.status_value)
    .bind(m.is_read as i64)
    .bind(&reactions)
    .bind(m.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

async fn mirror_message_tx(conn: &mut SqliteConnection, task_id: &str, m: &Message) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO task_messages
             (message_id, task_id, sender_id, recipient_id, content,
              attachment_url, kind, status_value, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&m.id)
    .bind(task_id)
    .bind(&m.sender_id)
    .bind(&m.recipient_id)
    .bind(&m.content)
    .bind(&m.attachment_url)
    .bind(m.kind.as_str())
    .bind(&m.status_value)
    .bind(m.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn preview_of(m: &Message) -> &str {
    if m.content.trim().is_empty() {
        ATTACHMENT_PREVIEW
    } else {
        &m.content
    }
}
