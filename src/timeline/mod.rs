// SPDX-License-Identifier: MIT
//! Merged per-task timeline.
//!
//! Interleaves a task's progress history with the messages of its
//! conversation into one chronological view. Status-update mirror messages
//! that duplicate a progress record are dropped; the canonical progress
//! entry wins. Mirrors with no matching record (written before the progress
//! table existed) are kept as plain messages so old conversations stay
//! complete.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::messages::{Message, MessageKind, MessageStore};
use crate::progress::{ProgressStore, ProgressUpdate};
use crate::tasks::TaskStorage;
use crate::threads::{ChatThread, ThreadStorage};

/// One row of the merged view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    StatusChange(ProgressUpdate),
    Message(Message),
}

impl TimelineEntry {
    pub fn timestamp(&self) -> i64 {
        match self {
            TimelineEntry::StatusChange(u) => u.created_at,
            TimelineEntry::Message(m) => m.created_at,
        }
    }

    /// Tie-break: a status change sorts before a message at the same
    /// instant, since the transition caused the conversation around it.
    fn rank(&self) -> u8 {
        match self {
            TimelineEntry::StatusChange(_) => 0,
            TimelineEntry::Message(_) => 1,
        }
    }
}

/// Read-only composition over tasks, threads, messages and progress.
#[derive(Clone)]
pub struct TimelineMerger {
    tasks: TaskStorage,
    threads: ThreadStorage,
    messages: MessageStore,
    progress: ProgressStore,
}

impl TimelineMerger {
    pub fn new(pool: SqlitePool, messages: MessageStore) -> Self {
        Self {
            tasks: TaskStorage::new(pool.clone()),
            threads: ThreadStorage::new(pool.clone()),
            messages,
            progress: ProgressStore::new(pool),
        }
    }

    /// The full merged timeline of a task, ascending by time.
    pub async fn merged_timeline(&self, task_id: &str) -> Result<Vec<TimelineEntry>> {
        let history = self.progress.history(task_id).await?;
        let messages = match self.conversation_of(task_id).await? {
            Some(thread) => self.messages.snapshot(&thread.id).await?,
            None => Vec::new(),
        };

        // Progress records are canonical; their chat mirrors are duplicates.
        let seen: HashSet<(&str, i64)> = history
            .iter()
            .map(|u| (u.status.as_str(), u.created_at))
            .collect();

        let mut entries: Vec<TimelineEntry> = Vec::with_capacity(history.len() + messages.len());
        entries.extend(history.iter().cloned().map(TimelineEntry::StatusChange));
        for m in messages {
            if m.kind == MessageKind::StatusUpdate {
                let duplicated = m
                    .status_value
                    .as_deref()
                    .is_some_and(|sv| seen.contains(&(sv, m.created_at)));
                if duplicated {
                    continue;
                }
                debug!(task_id, message_id = %m.id, "keeping unmatched status mirror");
            }
            entries.push(TimelineEntry::Message(m));
        }

        entries.sort_by_key(|e| (e.timestamp(), e.rank()));
        Ok(entries)
    }

    /// The conversation backing a task: the thread bound to it, or failing
    /// that the participants' pair thread.
    async fn conversation_of(&self, task_id: &str) -> Result<Option<ChatThread>> {
        if let Some(thread) = self.threads.for_task(task_id).await? {
            return Ok(Some(thread));
        }
        let task = self.tasks.get(task_id).await?;
        match task.participants() {
            Some((creator, performer)) => self.threads.for_pair(creator, performer).await,
            None => Ok(None),
        }
    }
}
