// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

use crate::tasks::TaskStatus;

/// One recorded status change of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub id: String,
    pub task_id: String,
    /// The status the task entered, not the one it left.
    pub status: TaskStatus,
    pub note: Option<String>,
    /// Who performed the transition.
    pub actor_id: String,
    pub created_at: i64,
}
