// SPDX-License-Identifier: MIT
//! Messages inside a thread: append, read receipts, reactions, live stream.
//!
//! Appends are idempotent (client-keyed), transactional with the thread
//! summary and the legacy per-task mirror, and stamped with server-assigned
//! timestamps that are strictly monotonic within a thread — consumers can
//! rely on ascending creation order regardless of client clock skew.

pub mod events;
pub mod model;
pub mod outbox;
pub mod store;

pub use events::{MessageBus, MessageEvent};
pub use model::{Message, MessageDraft, MessageKind};
pub use outbox::{PendingMessage, PendingOutbox};
pub use store::{AppendOutcome, MessageStore, SendOutcome};
