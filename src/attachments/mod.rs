// SPDX-License-Identifier: MIT
//! Attachment storage seam.
//!
//! Binary storage is external; the core only ever persists the stable
//! retrieval handle an upload returns. A message is written with an
//! attachment reference only after that handle is confirmed durable — upload
//! failure can therefore degrade a send to text-only, but can never leave a
//! message pointing at a blob that does not exist.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreError, Result};

/// Stable reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentHandle(pub String);

/// External binary storage: accepts bytes, returns a durable handle.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<AttachmentHandle>;
}

/// In-memory store for tests and demos.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, handle: &AttachmentHandle) -> bool {
        self.blobs.lock().unwrap().contains_key(&handle.0)
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<AttachmentHandle> {
        let key = format!("mem://{}/{}", uuid::Uuid::new_v4(), file_name);
        self.blobs
            .lock()
            .unwrap()
            .insert(key.clone(), bytes.to_vec());
        Ok(AttachmentHandle(key))
    }
}

/// Store that always fails. Exercises the degraded-send path in tests.
pub struct FailingAttachmentStore;

#[async_trait]
impl AttachmentStore for FailingAttachmentStore {
    async fn upload(&self, file_name: &str, _bytes: &[u8]) -> Result<AttachmentHandle> {
        Err(CoreError::AttachmentUploadFailed(format!(
            "upload of {file_name} refused"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_handles() {
        let store = MemoryAttachmentStore::new();
        let h = store.upload("receipt.jpg", b"bytes").await.unwrap();
        assert!(store.contains(&h));
        assert!(h.0.starts_with("mem://"));
    }

    #[tokio::test]
    async fn failing_store_reports_upload_failure() {
        let err = FailingAttachmentStore
            .upload("x.png", b"")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AttachmentUploadFailed(_)));
    }
}
