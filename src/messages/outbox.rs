// SPDX-License-Identifier: MIT
//! Client-side pending sends.
//!
//! A sender tracks drafts it has handed to the store but not yet seen echoed
//! on the live stream. The match key is the client idempotency key, so an
//! append that raced a reconnect still clears its pending entry when the
//! echo arrives.

use std::sync::Mutex;

use super::events::MessageEvent;
use super::model::MessageDraft;

/// One in-flight send awaiting its echo.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub client_key: String,
    pub thread_id: String,
    pub content: String,
    pub queued_at: i64,
}

/// Set of in-flight sends, cleared by observing the live message stream.
#[derive(Default)]
pub struct PendingOutbox {
    pending: Mutex<Vec<PendingMessage>>,
}

impl PendingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a draft that was just handed to the store.
    pub fn track(&self, thread_id: &str, draft: &MessageDraft, queued_at: i64) {
        let mut pending = self.pending.lock().unwrap();
        if pending.iter().any(|p| p.client_key == draft.client_key) {
            return;
        }
        pending.push(PendingMessage {
            client_key: draft.client_key.clone(),
            thread_id: thread_id.to_string(),
            content: draft.content.clone(),
            queued_at,
        });
    }

    /// Feed a live stream event through the outbox. An `Appended` echo clears
    /// the matching pending entry; updates are ignored.
    pub fn observe(&self, event: &MessageEvent) {
        if let MessageEvent::Appended(m) = event {
            self.pending
                .lock()
                .unwrap()
                .retain(|p| p.client_key != m.client_key);
        }
    }

    /// Entries still awaiting their echo, in queue order.
    pub fn pending(&self) -> Vec<PendingMessage> {
        self.pending.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::model::{Message, MessageKind};

    fn echo_of(draft: &MessageDraft, thread_id: &str) -> MessageEvent {
        MessageEvent::Appended(Message {
            id: "m1".into(),
            thread_id: thread_id.into(),
            client_key: draft.client_key.clone(),
            sender_id: draft.sender_id.clone(),
            recipient_id: Some("bob".into()),
            content: draft.content.clone(),
            attachment_url: None,
            kind: MessageKind::Text,
            status_value: None,
            is_read: false,
            reactions: Default::default(),
            created_at: 1,
        })
    }

    #[test]
    fn echo_clears_pending_entry() {
        let outbox = PendingOutbox::new();
        let draft = MessageDraft::text("alice", "hello");
        outbox.track("t1", &draft, 1);
        assert_eq!(outbox.pending().len(), 1);

        outbox.observe(&echo_of(&draft, "t1"));
        assert!(outbox.is_empty());
    }

    #[test]
    fn foreign_echo_leaves_entry_pending() {
        let outbox = PendingOutbox::new();
        let mine = MessageDraft::text("alice", "mine");
        let theirs = MessageDraft::text("bob", "theirs");
        outbox.track("t1", &mine, 1);

        outbox.observe(&echo_of(&theirs, "t1"));
        assert_eq!(outbox.pending().len(), 1);
        assert_eq!(outbox.pending()[0].client_key, mine.client_key);
    }

    #[test]
    fn duplicate_track_is_ignored() {
        let outbox = PendingOutbox::new();
        let draft = MessageDraft::text("alice", "hello");
        outbox.track("t1", &draft, 1);
        outbox.track("t1", &draft, 2);
        assert_eq!(outbox.pending().len(), 1);
    }
}
