// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// What kind of event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    /// A task status transition.
    Status,
    /// A new chat message.
    Message,
    /// A review was left for the user.
    Review,
    /// A badge was granted.
    Achievement,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Status => "status",
            NotificationCategory::Message => "message",
            NotificationCategory::Review => "review",
            NotificationCategory::Achievement => "achievement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "status" => NotificationCategory::Status,
            "message" => NotificationCategory::Message,
            "review" => NotificationCategory::Review,
            "achievement" => NotificationCategory::Achievement,
            _ => return None,
        })
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound signal to a user. Created once per triggering event; the
/// only later mutation is flipping the read flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub task_id: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
}
