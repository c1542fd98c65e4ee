use std::{path::Path as FilePath, sync::Arc};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::{parse_url, path::Path, ObjectStore};
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("invalid storage url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(#[from] object_store::Error),
}

/// Listing entry for one stored blob.
#[derive(Debug, Clone)]
pub struct BlobMetadata {
    pub name: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Blob-store wrapper scoped to a single container. The backend is chosen
/// by the connection URL scheme (`s3://`, `az://`, `file://`, `memory://`);
/// the container name becomes a key prefix under it.
pub struct DocumentStorage {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    base_url: String,
}

impl DocumentStorage {
    pub fn new(connection_string: &str, container: &str) -> Result<Self, StorageError> {
        let url = Url::parse(connection_string).map_err(|e| StorageError::InvalidUrl {
            url: connection_string.to_string(),
            reason: e.to_string(),
        })?;
        let (store, path) = parse_url(&url).map_err(|e| StorageError::InvalidUrl {
            url: connection_string.to_string(),
            reason: e.to_string(),
        })?;
        let base = connection_string
            .strip_suffix('/')
            .unwrap_or(connection_string);
        let base_url = format!("{base}/{container}");
        Ok(Self {
            store: Arc::new(store),
            prefix: path.child(container),
            base_url,
        })
    }

    /// Upload a local file as a blob, overwriting any blob with the same
    /// name. The blob name defaults to the source filename. Returns the
    /// access URL of the stored blob.
    pub async fn upload(
        &self,
        local_path: &FilePath,
        blob_name: Option<&str>,
    ) -> Result<String, StorageError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|_| StorageError::FileNotFound(local_path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(StorageError::FileNotFound(local_path.display().to_string()));
        }
        let name = match blob_name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| StorageError::FileNotFound(local_path.display().to_string()))?,
        };
        let data = Bytes::from(tokio::fs::read(local_path).await?);
        let location = self.prefix.child(name.as_str());
        self.store.put(&location, data.into()).await?;
        info!(blob = %name, size_bytes = metadata.len(), "uploaded document");
        Ok(self.url_for(&name))
    }

    /// List every blob in the container. Empty container yields an empty
    /// vec, not an error.
    pub async fn list(&self) -> Result<Vec<BlobMetadata>, StorageError> {
        let objects: Vec<_> = self.store.list(Some(&self.prefix)).try_collect().await?;
        Ok(objects
            .into_iter()
            .map(|meta| BlobMetadata {
                name: meta.location.filename().unwrap_or_default().to_string(),
                size_bytes: meta.size,
                last_modified: meta.last_modified,
            })
            .collect())
    }

    /// Deterministic access URL for a blob name. No network call.
    pub fn url_for(&self, blob_name: &str) -> String {
        format!("{}/{}", self.base_url, blob_name)
    }

    /// Fetch a blob and write its contents to `local_path`.
    pub async fn download(
        &self,
        blob_name: &str,
        local_path: &FilePath,
    ) -> Result<(), StorageError> {
        let location = self.prefix.child(blob_name);
        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                StorageError::BlobNotFound(blob_name.to_string())
            }
            other => StorageError::Backend(other),
        })?;
        let data = result.bytes().await?;
        tokio::fs::write(local_path, &data).await?;
        info!(blob = %blob_name, path = %local_path.display(), "downloaded document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_storage() -> DocumentStorage {
        DocumentStorage::new("memory:///", "legal-documents").unwrap()
    }

    #[tokio::test]
    async fn upload_list_download_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("contract.txt");
        std::fs::write(&source, "This is a contract.").unwrap();

        let storage = memory_storage();
        let url = storage.upload(&source, None).await.unwrap();
        assert_eq!(url, "memory:///legal-documents/contract.txt");

        let blobs = storage.list().await.unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].name, "contract.txt");
        assert_eq!(blobs[0].size_bytes, 19);

        let target = dir.path().join("downloaded.txt");
        storage.download("contract.txt", &target).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "This is a contract."
        );
    }

    #[tokio::test]
    async fn upload_to_local_filesystem() {
        let blob_dir = tempfile::tempdir().unwrap();
        let doc_dir = tempfile::tempdir().unwrap();
        let source = doc_dir.path().join("nda.md");
        std::fs::write(&source, "# NDA").unwrap();

        let connection = format!("file://{}", blob_dir.path().display());
        let storage = DocumentStorage::new(&connection, "legal-documents").unwrap();
        storage.upload(&source, None).await.unwrap();

        let stored = blob_dir.path().join("legal-documents/nda.md");
        assert_eq!(std::fs::read_to_string(stored).unwrap(), "# NDA");
    }

    #[tokio::test]
    async fn upload_overwrites_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("contract.txt");
        let storage = memory_storage();

        std::fs::write(&source, "first").unwrap();
        storage.upload(&source, None).await.unwrap();
        std::fs::write(&source, "second").unwrap();
        storage.upload(&source, None).await.unwrap();

        let blobs = storage.list().await.unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].size_bytes, 6);
    }

    #[tokio::test]
    async fn upload_missing_file_fails() {
        let storage = memory_storage();
        let err = storage
            .upload(FilePath::new("/nonexistent/contract.txt"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn download_missing_blob_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = memory_storage();
        let err = storage
            .download("absent.txt", &dir.path().join("out.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BlobNotFound(name) if name == "absent.txt"));
    }

    #[tokio::test]
    async fn list_empty_container() {
        let storage = memory_storage();
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[test]
    fn url_construction_is_deterministic() {
        let storage =
            DocumentStorage::new("file:///var/lib/legalindex/blobs/", "legal-documents").unwrap();
        assert_eq!(
            storage.url_for("contract.txt"),
            "file:///var/lib/legalindex/blobs/legal-documents/contract.txt"
        );
    }
}
