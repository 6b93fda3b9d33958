//! Request-side entry point shared by the HTTP handlers.
//!
//! Upload flows `ObjectStore::put` → `RetentionIndex::record`; download
//! decodes the path segment and goes straight to `ObjectStore::get`.

use crate::{
    models::object_id::ObjectId,
    services::{
        object_store::{ObjectStore, StoreError, StoreResult},
        retention_index::RetentionIndex,
    },
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// Cloneable handler state.
#[derive(Clone)]
pub struct ImageService {
    pub store: Arc<ObjectStore>,
    pub index: Arc<RetentionIndex>,
}

impl ImageService {
    pub fn new(store: Arc<ObjectStore>, index: Arc<RetentionIndex>) -> Self {
        Self { store, index }
    }

    /// Store an upload and start its retention clock.
    pub async fn upload(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> StoreResult<ObjectId> {
        let id = match self.store.put(bytes, content_type, filename).await {
            Ok(id) => id,
            Err(err) => {
                if let StoreError::UnsupportedType { declared } = &err {
                    debug!("rejected upload with content type {:?}", declared);
                }
                return Err(err);
            }
        };
        self.index.record(id.clone(), id.created_at());
        info!("accepted upload {} ({} bytes)", id, bytes.len());
        Ok(id)
    }

    /// Fetch by raw path segment. Anything that is not a well-formed id is
    /// `NotFound` without touching the disk.
    pub async fn download(&self, raw_id: &str) -> StoreResult<(ObjectId, Bytes)> {
        let id = ObjectId::parse(raw_id).map_err(|err| {
            debug!("download of malformed id {:?}: {}", raw_id, err);
            StoreError::NotFound(raw_id.to_string())
        })?;
        let bytes = self.store.get(&id).await?;
        Ok((id, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{clock::SystemClock, id_generator::IdGenerator};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ImageService {
        let ids = IdGenerator::new(12, Arc::new(SystemClock));
        let store = Arc::new(ObjectStore::new(dir.path(), ids, 64));
        ImageService::new(store, Arc::new(RetentionIndex::new()))
    }

    #[tokio::test]
    async fn upload_records_retention_entry() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let id = svc
            .upload(b"pixels", Some("image/png"), Some("cat.png"))
            .await
            .unwrap();

        assert!(svc.index.contains(&id));
        let (fetched_id, bytes) = svc.download(id.as_str()).await.unwrap();
        assert_eq!(fetched_id, id);
        assert_eq!(bytes.as_ref(), b"pixels");
    }

    #[tokio::test]
    async fn rejected_upload_is_not_indexed() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        assert!(svc.upload(b"x", Some("text/html"), Some("a.html")).await.is_err());
        assert!(svc.upload(&[0u8; 65], Some("image/png"), Some("a.png")).await.is_err());
        assert!(svc.index.is_empty());
    }

    #[tokio::test]
    async fn malformed_download_ids_are_not_found() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        std::fs::write(dir.path().join("secret"), b"nope").unwrap();

        for raw in ["secret", "..", "../etc_1.passwd", "abc_1.png%2F..", ""] {
            assert!(matches!(
                svc.download(raw).await,
                Err(StoreError::NotFound(_))
            ));
        }
    }
}
