// SPDX-License-Identifier: MIT
//! Task-lifecycle coordination core for a peer-to-peer task marketplace.
//!
//! Owns the task status state machine, the pair-keyed chat threads between
//! creators and performers, the message store (reactions, read receipts,
//! live streams), per-task progress history, the merged task timeline and
//! exactly-once notifications. Authentication, payments, discovery and
//! transport all live outside; embedders hand the core verified identity
//! strings and drive it through [`Core`].

pub mod attachments;
pub mod config;
pub mod error;
pub mod identity;
pub mod messages;
pub mod notify;
pub mod progress;
pub mod retry;
pub mod stats;
pub mod storage;
pub mod tasks;
pub mod threads;
pub mod timeline;

use std::path::Path;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::identity::SqliteDirectory;
use crate::messages::MessageStore;
use crate::notify::NotificationDispatcher;
use crate::progress::ProgressTracker;
use crate::stats::SqliteStats;
use crate::storage::Storage;
use crate::tasks::TaskStorage;
use crate::threads::{ThreadResolver, ThreadStorage};
use crate::timeline::TimelineMerger;

pub use crate::error::{CoreError, Result};

/// Fully wired coordination core over one SQLite database.
///
/// Cheap to clone; every component shares the same pool and event buses.
#[derive(Clone)]
pub struct Core {
    config: CoreConfig,
    directory: SqliteDirectory,
    tasks: TaskStorage,
    threads: ThreadStorage,
    resolver: ThreadResolver,
    messages: MessageStore,
    tracker: ProgressTracker,
    timeline: TimelineMerger,
    dispatcher: NotificationDispatcher,
    stats: Arc<SqliteStats>,
}

impl Core {
    /// Open (or create) the database under `data_dir` and wire everything
    /// up.
    pub async fn new(data_dir: &Path, config: CoreConfig) -> anyhow::Result<Self> {
        let storage = Storage::new(data_dir).await?;
        Ok(Self::wire(storage, config))
    }

    /// Fully in-memory core for tests and demos.
    pub async fn in_memory(config: CoreConfig) -> anyhow::Result<Self> {
        let storage = Storage::in_memory().await?;
        Ok(Self::wire(storage, config))
    }

    fn wire(storage: Storage, config: CoreConfig) -> Self {
        let pool = storage.pool();
        let directory = SqliteDirectory::new(pool.clone());
        let dispatcher = NotificationDispatcher::new(pool.clone(), Arc::new(directory.clone()));
        let retry = config.retry.to_retry_config();
        let messages = MessageStore::new(
            pool.clone(),
            dispatcher.clone(),
            config.messaging.mirror_task_messages,
        )
        .with_retry(retry.clone());
        let stats = Arc::new(SqliteStats::new(pool.clone()));
        let tracker = ProgressTracker::new(
            pool.clone(),
            messages.clone(),
            dispatcher.clone(),
            stats.clone(),
            config.messaging.mirror_status_messages,
        )
        .with_retry(retry);
        let timeline = TimelineMerger::new(pool.clone(), messages.clone());
        Self {
            config,
            directory,
            tasks: TaskStorage::new(pool.clone()),
            threads: ThreadStorage::new(pool.clone()),
            resolver: ThreadResolver::new(pool),
            messages,
            tracker,
            timeline,
            dispatcher,
            stats,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn directory(&self) -> &SqliteDirectory {
        &self.directory
    }

    pub fn tasks(&self) -> &TaskStorage {
        &self.tasks
    }

    pub fn threads(&self) -> &ThreadStorage {
        &self.threads
    }

    pub fn resolver(&self) -> &ThreadResolver {
        &self.resolver
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn timeline(&self) -> &TimelineMerger {
        &self.timeline
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &SqliteStats {
        &self.stats
    }
}
