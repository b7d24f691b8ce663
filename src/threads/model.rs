// SPDX-License-Identifier: MIT
//! Thread data model.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Canonical 1:1 conversation between two identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    /// Sorted participant pair: `user_a < user_b` lexicographically, so
    /// lookup is independent of who messaged first.
    pub user_a: String,
    pub user_b: String,
    /// First task associated with this pair. First-write-wins — never
    /// overwritten once set.
    pub task_id: Option<String>,
    /// Denormalized summary of the latest message, bumped atomically with
    /// every append.
    pub last_message: Option<String>,
    pub last_sender: Option<String>,
    pub last_message_at: Option<i64>,
    pub created_at: i64,
}

impl ChatThread {
    /// The participant who is not `user_id`, if `user_id` is a member.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// Normalize a participant pair to its canonical sorted form.
///
/// Fails with `InvalidIdentity` when either identity is empty or the two are
/// the same user — a thread always has exactly two distinct participants.
pub fn pair_key<'a>(a: &'a str, b: &'a str) -> Result<(&'a str, &'a str)> {
    if a.is_empty() || b.is_empty() {
        return Err(CoreError::InvalidIdentity(
            "participant identity is empty".into(),
        ));
    }
    if a == b {
        return Err(CoreError::InvalidIdentity(format!(
            "cannot open a thread with oneself: {a}"
        )));
    }
    Ok(if a < b { (a, b) } else { (b, a) })
}
