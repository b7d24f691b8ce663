// SPDX-License-Identifier: MIT
//! Live message stream.
//!
//! One broadcast bus carries events for every thread; subscribers filter by
//! `thread_id`. A consumer that takes a snapshot and then applies events in
//! arrival order reconstructs the full ordered message list without ever
//! re-reading from scratch: `Appended` inserts (timestamps are monotonic per
//! thread, so arrival order equals timestamp order) and `Updated` replaces
//! in place by id.

use tokio::sync::broadcast;

use super::model::Message;

/// Capacity of the broadcast channel.
/// Slow consumers lag and skip old events rather than blocking senders.
const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum MessageEvent {
    /// A new message was committed.
    Appended(Message),
    /// An existing message changed (read flag, reactions, late attachment).
    Updated(Message),
}

impl MessageEvent {
    pub fn thread_id(&self) -> &str {
        match self {
            MessageEvent::Appended(m) | MessageEvent::Updated(m) => &m.thread_id,
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            MessageEvent::Appended(m) | MessageEvent::Updated(m) => m,
        }
    }
}

/// Shared broadcast bus for message events.
///
/// Clone cheaply — the underlying `broadcast::Sender` is Arc-backed.
#[derive(Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<MessageEvent>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Receive events emitted after this call. Earlier events are not
    /// replayed; pair with a snapshot for full state.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.sender.subscribe()
    }

    /// Emit to all current subscribers; dropped silently when nobody
    /// listens.
    pub fn emit(&self, event: MessageEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
