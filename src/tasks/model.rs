// SPDX-License-Identifier: MIT
//! Task data model and the status state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// The forward flow is `open → accepted → picked_up → in_progress → on_way →
/// delivered → completed`; `cancelled` is reachable from any non-terminal
/// state. `completed` and `cancelled` have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Accepted,
    PickedUp,
    InProgress,
    OnWay,
    Delivered,
    Completed,
    Cancelled,
}

/// The forward status flow, in order. `cancelled` is deliberately absent —
/// it is a side exit, never a "next" status.
pub const STATUS_FLOW: [TaskStatus; 7] = [
    TaskStatus::Open,
    TaskStatus::Accepted,
    TaskStatus::PickedUp,
    TaskStatus::InProgress,
    TaskStatus::OnWay,
    TaskStatus::Delivered,
    TaskStatus::Completed,
];

impl TaskStatus {
    /// Canonical string stored in `tasks.status` and `progress_updates.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Accepted => "accepted",
            TaskStatus::PickedUp => "picked_up",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::OnWay => "on_way",
            TaskStatus::Delivered => "delivered",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "open" => TaskStatus::Open,
            "accepted" => TaskStatus::Accepted,
            "picked_up" => TaskStatus::PickedUp,
            "in_progress" => TaskStatus::InProgress,
            "on_way" => TaskStatus::OnWay,
            "delivered" => TaskStatus::Delivered,
            "completed" => TaskStatus::Completed,
            "cancelled" => TaskStatus::Cancelled,
            _ => return None,
        })
    }

    /// Human-readable label ("picked_up" → "Picked Up") used in notification
    /// bodies and mirrored status messages.
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|w| {
                let mut c = w.chars();
                match c.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The next status in the forward flow, or `None` from a terminal state
    /// (and from `cancelled`, which is off the flow).
    pub fn next(&self) -> Option<TaskStatus> {
        let idx = STATUS_FLOW.iter().position(|s| s == self)?;
        STATUS_FLOW.get(idx + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work posted on the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Positive currency amount, credited to the performer on completion.
    pub price: f64,
    pub status: TaskStatus,
    pub created_by: String,
    /// `None` iff status is `open`; immutable once set.
    pub accepted_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl Task {
    /// The two parties of the task, once a performer exists.
    pub fn participants(&self) -> Option<(&str, &str)> {
        self.accepted_by
            .as_deref()
            .map(|p| (self.created_by.as_str(), p))
    }
}
