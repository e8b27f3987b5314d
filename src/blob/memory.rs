//! In-memory blob store for tests.

use super::BlobAdapter;
use crate::config::DEFAULT_RETENTION_EPOCHS;
use crate::error::{MessagingError, MessagingResult};
use crate::types::{AttachmentReference, AttachmentUpload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock blob adapter. Ids are `blob-1`, `blob-2`, ... in publish order.
#[derive(Clone, Default)]
pub struct MemoryBlobAdapter {
    state: Arc<Mutex<BlobState>>,
}

#[derive(Default)]
struct BlobState {
    blobs: HashMap<String, AttachmentUpload>,
    next_id: u64,
    unavailable: bool,
}

impl MemoryBlobAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BlobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail publishes with HTTP 503 while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Bytes of a published blob.
    pub fn get(&self, blob_id: &str) -> Option<Vec<u8>> {
        self.state().blobs.get(blob_id).map(|u| u.bytes.clone())
    }

    /// Full upload as published, including mime type and filename.
    pub fn upload(&self, blob_id: &str) -> Option<AttachmentUpload> {
        self.state().blobs.get(blob_id).cloned()
    }

    pub fn published_count(&self) -> usize {
        self.state().blobs.len()
    }
}

#[async_trait]
impl BlobAdapter for MemoryBlobAdapter {
    async fn publish_attachment(
        &self,
        upload: &AttachmentUpload,
    ) -> MessagingResult<AttachmentReference> {
        let mut state = self.state();
        if state.unavailable {
            return Err(MessagingError::http_status("blob store", 503));
        }

        state.next_id += 1;
        let blob_id = format!("blob-{}", state.next_id);
        state.blobs.insert(blob_id.clone(), upload.clone());

        Ok(AttachmentReference {
            url: format!("memory://{blob_id}"),
            blob_id,
            retention: upload.retention.unwrap_or(DEFAULT_RETENTION_EPOCHS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_ids_and_read_back() {
        let store = MemoryBlobAdapter::new();

        let first = store
            .publish_attachment(&AttachmentUpload::new(vec![1, 2], "text/plain"))
            .await
            .unwrap();
        let second = store
            .publish_attachment(&AttachmentUpload::new(vec![3], "text/plain").with_retention(4))
            .await
            .unwrap();

        assert_eq!(first.blob_id, "blob-1");
        assert_eq!(first.url, "memory://blob-1");
        assert_eq!(first.retention, DEFAULT_RETENTION_EPOCHS);
        assert_eq!(second.blob_id, "blob-2");
        assert_eq!(second.retention, 4);
        assert_eq!(store.get("blob-1"), Some(vec![1, 2]));
        assert_eq!(store.get("blob-9"), None);
    }

    #[tokio::test]
    async fn test_unavailable_publishes_nothing() {
        let store = MemoryBlobAdapter::new();
        store.set_unavailable(true);

        let err = store
            .publish_attachment(&AttachmentUpload::new(vec![1], "text/plain"))
            .await
            .unwrap_err();

        assert_eq!(err.kind().as_deref(), Some("http_status"));
        assert_eq!(err.context().get("status").map(String::as_str), Some("503"));
        assert_eq!(store.published_count(), 0);
    }
}
