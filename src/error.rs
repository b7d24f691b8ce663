// SPDX-License-Identifier: MIT
//! Error taxonomy for the coordination core.
//!
//! Validation errors (`InvalidIdentity`, `Unauthorized`, `NoNextStatus`,
//! `InvalidRecipient`, `InvalidMessage`, `InvalidTask`) are rejected
//! synchronously and must never be retried. `StoreUnavailable` is transient — callers retry it with
//! [`crate::retry::retry_with_backoff`]. `AttachmentUploadFailed` degrades
//! gracefully: the text portion of a message still goes out.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// An identity was empty, or a participant pair collapsed to one user.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// The actor is not allowed to perform this transition.
    #[error("unauthorized: {actor} may not act on task {task_id}")]
    Unauthorized { actor: String, task_id: String },

    /// The task is in a terminal state (or off the flow) — no next status.
    #[error("no next status from '{status}'")]
    NoNextStatus { status: String },

    /// The notification recipient is not a known user.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// A message must carry non-empty text or an attachment.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A task field failed validation (e.g. non-positive price).
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// The attachment never became durable; text-only delivery may proceed.
    #[error("attachment upload failed: {0}")]
    AttachmentUploadFailed(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Transient backend failure. Safe to retry — every non-idempotent write
    /// carries a client key.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn unauthorized(actor: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor: actor.into(),
            task_id: task_id.into(),
        }
    }

    /// Whether the caller should retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::AttachmentUploadFailed(_)
        )
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CoreError::not_found("row", "?"),
            other => CoreError::StoreUnavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
