//! Blob store HTTP publisher.
//!
//! `POST {endpoint}` with `{blob, mimeType, filename?, retention?}` (blob is
//! base64) answers `{blobId, url, retention}`.

use super::BlobAdapter;
use crate::config::{BlobStoreConfig, DEFAULT_RETENTION_EPOCHS};
use crate::error::{MessagingError, MessagingResult};
use crate::types::{AttachmentReference, AttachmentUpload};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SERVICE: &str = "blob store";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    blob: String,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    blob_id: String,
    url: String,
    retention: u32,
}

/// Network-backed blob adapter.
pub struct HttpBlobAdapter {
    client: reqwest::Client,
    endpoint: String,
    default_retention: u32,
}

impl HttpBlobAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            default_retention: DEFAULT_RETENTION_EPOCHS,
        }
    }

    pub fn from_config(config: &BlobStoreConfig) -> Self {
        Self::new(config.endpoint.clone()).with_default_retention(config.default_retention)
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Retention sent when an upload leaves it unset.
    pub fn with_default_retention(mut self, epochs: u32) -> Self {
        self.default_retention = epochs;
        self
    }
}

#[async_trait]
impl BlobAdapter for HttpBlobAdapter {
    async fn publish_attachment(
        &self,
        upload: &AttachmentUpload,
    ) -> MessagingResult<AttachmentReference> {
        let request = PublishRequest {
            blob: BASE64.encode(&upload.bytes),
            mime_type: &upload.mime_type,
            filename: upload.filename.as_deref(),
            retention: Some(upload.retention.unwrap_or(self.default_retention)),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| MessagingError::network(SERVICE, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), size = upload.bytes.len(), "blob store response");
        if !status.is_success() {
            return Err(MessagingError::http_status(SERVICE, status.as_u16()));
        }

        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| MessagingError::network(SERVICE, e))?;
        info!(blob_id = %published.blob_id, retention = published.retention, "attachment published");

        Ok(AttachmentReference {
            blob_id: published.blob_id,
            url: published.url,
            retention: published.retention,
        })
    }
}
