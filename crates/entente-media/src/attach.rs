//! Attachment storage adapter.
//!
//! Uploads never block composition: the client appends the message
//! optimistically, then resolves the attachment through a store. A
//! failed upload degrades to a filename-only reference instead of
//! failing the send.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use entente_shared::constants::MAX_BLOB_SIZE;
use entente_shared::types::AttachmentRef;

use crate::error::StorageError;

/// External blob storage seam. Implementations return a URL that the
/// remote side can fetch the attachment from.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, data: Vec<u8>, filename: &str) -> Result<String, StorageError>;
}

/// Store an attachment, degrading to a name-only reference on any
/// storage failure. The message relays either way.
pub async fn store_or_degrade(
    store: &dyn AttachmentStore,
    data: Vec<u8>,
    filename: &str,
) -> AttachmentRef {
    match store.store(data, filename).await {
        Ok(url) => AttachmentRef::stored(filename, url),
        Err(e) => {
            warn!(filename, error = %e, "Attachment upload failed, relaying name only");
            AttachmentRef::degraded(filename)
        }
    }
}

#[derive(Deserialize)]
struct BlobUploadResponse {
    id: Uuid,
    url: String,
}

/// Uploads blobs to an entente-server over its multipart endpoint.
pub struct HttpAttachmentStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAttachmentStore {
    /// `endpoint` is the server base URL, e.g. `http://host:8080`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    async fn store(&self, data: Vec<u8>, filename: &str) -> Result<String, StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: MAX_BLOB_SIZE,
            });
        }

        let size = data.len();
        let part = reqwest::multipart::Part::bytes(data).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/blob/upload", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::Rejected(format!(
                "upload returned {}",
                resp.status()
            )));
        }

        let body: BlobUploadResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        info!(filename, id = %body.id, size, "Attachment uploaded");
        Ok(body.url)
    }
}

/// In-process store producing `blob:<uuid>` references. Blobs live
/// only as long as the store itself; also serves as the test double.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    reject: bool,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every upload, for degradation paths.
    pub fn rejecting() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            reject: true,
        }
    }

    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn store(&self, data: Vec<u8>, _filename: &str) -> Result<String, StorageError> {
        if self.reject {
            return Err(StorageError::Rejected("store disabled".to_string()));
        }
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: MAX_BLOB_SIZE,
            });
        }
        let url = format!("blob:{}", Uuid::new_v4());
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(url.clone(), data);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryAttachmentStore::new();
        let url = store.store(b"hello".to_vec(), "note.txt").await.unwrap();
        assert!(url.starts_with("blob:"));
        assert_eq!(store.get(&url), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_store_or_degrade_keeps_name_on_failure() {
        let store = MemoryAttachmentStore::rejecting();
        let attachment = store_or_degrade(&store, b"payload".to_vec(), "photo.png").await;
        assert_eq!(attachment.name, "photo.png");
        assert!(attachment.url.is_none());
        assert!(!attachment.is_stored());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_or_degrade_returns_url_on_success() {
        let store = MemoryAttachmentStore::new();
        let attachment = store_or_degrade(&store, b"payload".to_vec(), "photo.png").await;
        assert!(attachment.is_stored());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_blob_rejected() {
        let store = MemoryAttachmentStore::new();
        let big = vec![0u8; MAX_BLOB_SIZE + 1];
        assert!(matches!(
            store.store(big, "big.bin").await,
            Err(StorageError::TooLarge { .. })
        ));
    }
}
