//! Attachment storage.
//!
//! Attachments live in a content-addressed blob store. The ledger only
//! records the blob id returned on publish.

pub mod http;
pub mod memory;

pub use http::HttpBlobAdapter;
pub use memory::MemoryBlobAdapter;

use crate::error::MessagingResult;
use crate::types::{AttachmentReference, AttachmentUpload};
use async_trait::async_trait;

/// Blob store abstraction.
#[async_trait]
pub trait BlobAdapter: Send + Sync {
    /// Store the upload and return its reference. Must complete before any
    /// transaction that names the blob is built.
    async fn publish_attachment(
        &self,
        upload: &AttachmentUpload,
    ) -> MessagingResult<AttachmentReference>;
}
