// SPDX-License-Identifier: MIT
//! Task progress: acceptance, forward transitions, cancellation and the
//! per-task history of status changes.
//!
//! The tracker is the only writer of task status. Every transition commits
//! the status flip, its progress record and the optional chat mirror in one
//! transaction, then fans out notifications after commit.

pub mod events;
pub mod model;
pub mod storage;
pub mod tracker;

pub use events::{ProgressBus, ProgressEvent};
pub use model::ProgressUpdate;
pub use storage::ProgressStore;
pub use tracker::ProgressTracker;
