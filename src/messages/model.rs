// SPDX-License-Identifier: MIT
//! Message data model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachments::AttachmentHandle;
use crate::error::{CoreError, Result};

/// What a message row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary text (possibly with an attachment added later).
    Text,
    /// Sent primarily for its attachment.
    Attachment,
    /// Mirror of a status transition, kept for legacy chat clients.
    StatusUpdate,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Attachment => "attachment",
            MessageKind::StatusUpdate => "status_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "text" => MessageKind::Text,
            "attachment" => MessageKind::Attachment,
            "status_update" => MessageKind::StatusUpdate,
            _ => return None,
        })
    }
}

/// One unit of communication inside a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    /// Caller-supplied idempotency key; a retried append of the same logical
    /// message resolves to the existing row.
    pub client_key: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    /// May be empty only when an attachment is present.
    pub content: String,
    pub attachment_url: Option<String>,
    pub kind: MessageKind,
    /// Set only on `status_update` mirrors; part of the timeline dedup key.
    pub status_value: Option<String>,
    pub is_read: bool,
    /// identity → emoji; at most one active reaction per identity.
    pub reactions: HashMap<String, String>,
    pub created_at: i64,
}

/// What a sender submits. The server assigns id, timestamp and recipient.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub client_key: String,
    pub sender_id: String,
    pub content: String,
    pub attachment: Option<AttachmentHandle>,
}

impl MessageDraft {
    /// Draft for a plain text message with a fresh idempotency key.
    pub fn text(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            client_key: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            content: content.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, handle: AttachmentHandle) -> Self {
        self.attachment = Some(handle);
        self
    }

    pub fn with_client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = key.into();
        self
    }

    /// A valid message carries non-empty text, an attachment, or both.
    pub fn validate(&self) -> Result<()> {
        if self.sender_id.is_empty() {
            return Err(CoreError::InvalidIdentity("sender is empty".into()));
        }
        if self.client_key.is_empty() {
            return Err(CoreError::InvalidMessage("client key is empty".into()));
        }
        if self.content.trim().is_empty() && self.attachment.is_none() {
            return Err(CoreError::InvalidMessage(
                "message needs text or an attachment".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn kind(&self) -> MessageKind {
        if self.content.trim().is_empty() {
            MessageKind::Attachment
        } else {
            MessageKind::Text
        }
    }
}

/// Toggle `user`'s reaction on a reaction map: same emoji removes the entry,
/// anything else sets/replaces it. Returns true when the map changed (it
/// always does — the toggle has no no-op case).
pub(crate) fn toggle_reaction_entry(
    reactions: &mut HashMap<String, String>,
    user_id: &str,
    emoji: &str,
) {
    match reactions.get(user_id) {
        Some(current) if current == emoji => {
            reactions.remove(user_id);
        }
        _ => {
            reactions.insert(user_id.to_string(), emoji.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_messages_are_invalid() {
        let draft = MessageDraft::text("alice", "   ");
        assert!(draft.validate().is_err());
    }

    #[test]
    fn attachment_only_is_valid() {
        let draft = MessageDraft::text("alice", "")
            .with_attachment(AttachmentHandle("blob://x".into()));
        assert!(draft.validate().is_ok());
        assert_eq!(draft.kind(), MessageKind::Attachment);
    }

    #[test]
    fn text_with_attachment_is_text_kind() {
        let draft = MessageDraft::text("alice", "see photo")
            .with_attachment(AttachmentHandle("blob://x".into()));
        assert!(draft.validate().is_ok());
        assert_eq!(draft.kind(), MessageKind::Text);
    }

    #[test]
    fn different_emoji_replaces_prior_reaction() {
        let mut reactions = HashMap::new();
        toggle_reaction_entry(&mut reactions, "alice", "👍");
        assert_eq!(reactions.get("alice").map(String::as_str), Some("👍"));

        toggle_reaction_entry(&mut reactions, "alice", "❤️");
        assert_eq!(reactions.get("alice").map(String::as_str), Some("❤️"));
        assert_eq!(reactions.len(), 1);
    }

    proptest! {
        /// Toggling the same (user, emoji) twice returns the map to its
        /// original state — react, then un-react.
        #[test]
        fn double_toggle_is_identity(
            user in "[a-z]{1,8}",
            emoji in prop::sample::select(vec!["❤️", "👍", "😂", "😮", "😢", "😡"]),
            already_reacted in proptest::bool::ANY,
            others in prop::collection::hash_map("[a-z]{1,8}", "[👍😂]", 0..4),
        ) {
            let mut reactions: HashMap<String, String> = others
                .into_iter()
                .filter(|(k, _)| k != &user)
                .collect();
            if already_reacted {
                reactions.insert(user.clone(), emoji.to_string());
            }
            let original = reactions.clone();

            toggle_reaction_entry(&mut reactions, &user, emoji);
            toggle_reaction_entry(&mut reactions, &user, emoji);
            prop_assert_eq!(reactions, original);
        }
    }
}
