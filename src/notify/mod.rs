// SPDX-License-Identifier: MIT
//! Outbound notifications.
//!
//! The dispatcher is a pure create: one record per call, no internal
//! deduplication. Upstream components (message store, progress tracker)
//! guarantee single invocation per logical event — appends only notify when
//! the idempotent insert actually created a row, and transitions are
//! serialized by their status precondition.

pub mod dispatcher;
pub mod model;

pub use dispatcher::{NotificationDispatcher, NotificationEvent};
pub use model::{Notification, NotificationCategory};
