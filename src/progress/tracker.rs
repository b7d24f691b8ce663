// SPDX-License-Identifier: MIT
//! The single writer of task status.

use std::sync::Arc;

use sqlx::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::messages::{MessageEvent, MessageStore};
use crate::notify::{NotificationCategory, NotificationDispatcher};
use crate::retry::{retry_transient, RetryConfig};
use crate::stats::StatsLedger;
use crate::tasks::{Task, TaskStatus, TaskStorage};
use crate::threads::storage::ThreadRow;
use crate::threads::ChatThread;

use super::events::{ProgressBus, ProgressEvent};
use super::model::ProgressUpdate;
use super::storage::ProgressStore;

/// Drives the task status state machine.
///
/// Transitions are conditional writes guarded by the expected current
/// status, so a retried or racing transition applies at most once. The chat
/// mirror (a `status_update` message in the task-bound thread) commits in
/// the same transaction as the status flip and its progress record.
#[derive(Clone)]
pub struct ProgressTracker {
    pool: SqlitePool,
    messages: MessageStore,
    dispatcher: NotificationDispatcher,
    stats: Arc<dyn StatsLedger>,
    bus: ProgressBus,
    /// Mirror each transition into the task-bound chat thread.
    mirror_status_messages: bool,
    /// Backoff for post-commit side effects (credit, notifications).
    retry: RetryConfig,
}

impl ProgressTracker {
    pub fn new(
        pool: SqlitePool,
        messages: MessageStore,
        dispatcher: NotificationDispatcher,
        stats: Arc<dyn StatsLedger>,
        mirror_status_messages: bool,
    ) -> Self {
        Self {
            pool,
            messages,
            dispatcher,
            stats,
            bus: ProgressBus::new(),
            mirror_status_messages,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.bus.subscribe()
    }

    pub async fn history(&self, task_id: &str) -> Result<Vec<ProgressUpdate>> {
        ProgressStore::new(self.pool.clone()).history(task_id).await
    }

    /// Claim an open task. Of two concurrent acceptors exactly one wins; the
    /// loser sees `NoNextStatus` because the task is no longer open.
    pub async fn accept(&self, task_id: &str, performer: &str) -> Result<Task> {
        if performer.is_empty() {
            return Err(CoreError::InvalidIdentity("performer is empty".into()));
        }

        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        let task = TaskStorage::fetch_tx(&mut tx, task_id).await?;
        if task.created_by == performer {
            return Err(CoreError::InvalidIdentity(format!(
                "'{performer}' cannot accept their own task"
            )));
        }

        let thread = self.bound_thread_tx(&mut tx, task_id).await?;
        let ts = transition_ts_tx(&mut tx, task_id, thread.as_ref()).await?;
        if !TaskStorage::claim_tx(&mut tx, task_id, performer, ts).await? {
            return Err(CoreError::NoNextStatus {
                status: task.status.as_str().to_string(),
            });
        }
        let update =
            ProgressStore::append_tx(&mut tx, task_id, TaskStatus::Accepted, None, performer, ts)
                .await?;
        let mirrored = self
            .write_mirror_tx(&mut tx, thread.as_ref(), task_id, performer, TaskStatus::Accepted, ts)
            .await?;
        tx.commit().await.map_err(CoreError::from)?;

        info!(task_id, performer, "task accepted");
        self.fan_out(update, mirrored);
        self.notify_status(&task.created_by, &task, TaskStatus::Accepted)
            .await;

        TaskStorage::new(self.pool.clone()).get(task_id).await
    }

    /// Move the task one step along the forward flow. Only the assigned
    /// performer may advance. Returns the status entered.
    pub async fn advance(
        &self,
        task_id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> Result<TaskStatus> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        let task = TaskStorage::fetch_tx(&mut tx, task_id).await?;
        if task.accepted_by.as_deref() != Some(actor) {
            return Err(CoreError::unauthorized(actor, task_id));
        }
        let next = task.status.next().ok_or_else(|| CoreError::NoNextStatus {
            status: task.status.as_str().to_string(),
        })?;

        let thread = self.bound_thread_tx(&mut tx, task_id).await?;
        let ts = transition_ts_tx(&mut tx, task_id, thread.as_ref()).await?;
        if !TaskStorage::apply_status_tx(&mut tx, task_id, task.status, next, ts).await? {
            // The guard failed: another transition landed first.
            return Err(CoreError::NoNextStatus {
                status: task.status.as_str().to_string(),
            });
        }
        let update = ProgressStore::append_tx(&mut tx, task_id, next, note, actor, ts).await?;
        let mirrored = self
            .write_mirror_tx(&mut tx, thread.as_ref(), task_id, actor, next, ts)
            .await?;
        tx.commit().await.map_err(CoreError::from)?;

        info!(task_id, actor, status = %next, "task advanced");
        self.fan_out(update, mirrored);

        if next == TaskStatus::Completed {
            self.settle_completion(&task, actor).await;
        } else {
            self.notify_status(&task.created_by, &task, next).await;
        }
        Ok(next)
    }

    /// Cancel from any non-terminal state. Allowed to the creator or the
    /// assigned performer.
    pub async fn cancel(&self, task_id: &str, actor: &str, note: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        let task = TaskStorage::fetch_tx(&mut tx, task_id).await?;
        let is_party = task.created_by == actor || task.accepted_by.as_deref() == Some(actor);
        if !is_party {
            return Err(CoreError::unauthorized(actor, task_id));
        }
        if task.status.is_terminal() {
            return Err(CoreError::NoNextStatus {
                status: task.status.as_str().to_string(),
            });
        }

        let thread = self.bound_thread_tx(&mut tx, task_id).await?;
        let ts = transition_ts_tx(&mut tx, task_id, thread.as_ref()).await?;
        if !TaskStorage::apply_status_tx(&mut tx, task_id, task.status, TaskStatus::Cancelled, ts)
            .await?
        {
            return Err(CoreError::NoNextStatus {
                status: task.status.as_str().to_string(),
            });
        }
        let update =
            ProgressStore::append_tx(&mut tx, task_id, TaskStatus::Cancelled, note, actor, ts)
                .await?;
        let mirrored = self
            .write_mirror_tx(&mut tx, thread.as_ref(), task_id, actor, TaskStatus::Cancelled, ts)
            .await?;
        tx.commit().await.map_err(CoreError::from)?;

        info!(task_id, actor, "task cancelled");
        self.fan_out(update, mirrored);

        // Tell the party that did not cancel.
        if task.created_by != actor {
            self.notify_status(&task.created_by, &task, TaskStatus::Cancelled)
                .await;
        } else if let Some(performer) = task.accepted_by.as_deref() {
            self.notify(
                performer,
                NotificationCategory::Status,
                "Task Status Updated",
                &format!(
                    "The task \"{}\" is now {}",
                    task.title,
                    TaskStatus::Cancelled.label()
                ),
                &task.id,
            )
            .await;
        }
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// The thread bound to this task, if mirroring is on and one exists.
    async fn bound_thread_tx(
        &self,
        conn: &mut SqliteConnection,
        task_id: &str,
    ) -> Result<Option<ChatThread>> {
        if !self.mirror_status_messages {
            return Ok(None);
        }
        let row: Option<ThreadRow> =
            sqlx::query_as("SELECT * FROM threads WHERE task_id = ? LIMIT 1")
                .bind(task_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(row.map(ChatThread::from))
    }

    /// Mirror a transition into the bound thread as a `status_update`
    /// message.
    async fn write_mirror_tx(
        &self,
        conn: &mut SqliteConnection,
        thread: Option<&ChatThread>,
        task_id: &str,
        actor: &str,
        status: TaskStatus,
        ts: i64,
    ) -> Result<Option<crate::messages::Message>> {
        let Some(thread) = thread else {
            return Ok(None);
        };
        let message = MessageStore::append_status_message_tx(
            conn,
            thread,
            task_id,
            actor,
            status,
            ts,
            self.messages.mirrors_task_messages(),
        )
        .await?;
        Ok(Some(message))
    }

    fn fan_out(&self, update: ProgressUpdate, mirrored: Option<crate::messages::Message>) {
        self.bus.emit(ProgressEvent::Transition(update));
        if let Some(message) = mirrored {
            self.messages.bus().emit(MessageEvent::Appended(message));
        }
    }

    async fn notify_status(&self, recipient: &str, task: &Task, status: TaskStatus) {
        self.notify(
            recipient,
            NotificationCategory::Status,
            "Task Status Updated",
            &format!("Your task \"{}\" is now {}", task.title, status.label()),
            &task.id,
        )
        .await;
    }

    /// Credit the performer and send the completion notifications. The
    /// status flip is already committed, so the credit is retried through
    /// transient store failures rather than dropped; only a final failure is
    /// logged.
    async fn settle_completion(&self, task: &Task, performer: &str) {
        let credited = retry_transient(&self.retry, || {
            self.stats.credit_completion(performer, task.price)
        })
        .await;
        let new_badges = match credited {
            Ok(credit) => credit.new_badges,
            Err(e) => {
                warn!(task_id = %task.id, performer, err = %e, "completion credit failed");
                Vec::new()
            }
        };
        self.bus.emit(ProgressEvent::Completed {
            task_id: task.id.clone(),
            performer: performer.to_string(),
            new_badges: new_badges.clone(),
        });

        self.notify(
            &task.created_by,
            NotificationCategory::Status,
            "Task Completed",
            &format!(
                "Your task \"{}\" has been completed successfully!",
                task.title
            ),
            &task.id,
        )
        .await;
        self.notify(
            performer,
            NotificationCategory::Status,
            "Task Completed",
            &format!("The task \"{}\" has been marked as completed.", task.title),
            &task.id,
        )
        .await;
        for badge in &new_badges {
            self.notify(
                performer,
                NotificationCategory::Achievement,
                &format!("🏆 New Badge: {badge}"),
                &format!("Congratulations! You've earned the \"{badge}\" badge!"),
                &task.id,
            )
            .await;
        }
    }

    /// Post-commit notification. Transient delivery failures are retried so
    /// the notification a committed transition owes is not silently dropped.
    async fn notify(
        &self,
        recipient: &str,
        category: NotificationCategory,
        title: &str,
        body: &str,
        task_id: &str,
    ) {
        let delivery = retry_transient(&self.retry, || {
            self.dispatcher
                .notify(recipient, category, title, body, Some(task_id))
        })
        .await;
        if let Err(e) = delivery {
            warn!(task_id, recipient, err = %e, "status notification failed");
        }
    }
}

/// Timestamp for a transition: strictly ahead of the task's progress records
/// and, when a thread is bound, of that thread's chat messages. The same
/// value stamps the progress row and its chat mirror, so the mirror never
/// sorts behind messages already in the thread.
async fn transition_ts_tx(
    conn: &mut SqliteConnection,
    task_id: &str,
    thread: Option<&ChatThread>,
) -> Result<i64> {
    let mut ts = ProgressStore::next_ts_tx(&mut *conn, task_id).await?;
    if let Some(thread) = thread {
        ts = ts.max(crate::messages::store::next_ts_tx(&mut *conn, &thread.id).await?);
    }
    Ok(ts)
}
