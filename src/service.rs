use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    blob_storage::{BlobMetadata, DocumentStorage},
    document::{self, DocumentRecord, ScoredDocument},
    extract,
    retry::RetryPolicy,
    search_index::{DocumentSearchIndex, SearchIndexTS},
    server_config::ServerConfig,
};

/// Per-file outcome of a directory ingestion. Unsupported file types are
/// skipped, not failed.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct StorageStatistics {
    pub document_count: usize,
    pub total_size_bytes: u64,
}

#[derive(Debug)]
pub struct IndexStatistics {
    pub document_count: u64,
}

#[derive(Debug)]
pub struct Statistics {
    pub storage: StorageStatistics,
    pub search_index: IndexStatistics,
}

/// Facade over document storage and the search index: uploads a blob,
/// builds the index record, and keeps the two backends in step. Index
/// provisioning happens once, at construction.
pub struct DocumentManager {
    storage: DocumentStorage,
    search_index: SearchIndexTS,
    retry: RetryPolicy,
}

impl DocumentManager {
    pub async fn new(config: &ServerConfig) -> Result<Self> {
        let storage = DocumentStorage::new(
            &config.storage_connection_string,
            &config.storage_container_name,
        )
        .context("unable to initialize document storage")?;
        let search_index = Arc::new(
            DocumentSearchIndex::new(
                &config.search_service_endpoint,
                &config.search_api_key,
                &config.search_index_name,
            )
            .context("unable to initialize search index client")?,
        );
        Self::with_backends(storage, search_index, RetryPolicy::from(&config.retry)).await
    }

    /// Build the facade from pre-constructed backends. The seam the
    /// original exposes for running against stand-in backends.
    pub async fn with_backends(
        storage: DocumentStorage,
        search_index: SearchIndexTS,
        retry: RetryPolicy,
    ) -> Result<Self> {
        retry
            .run(
                "creating search index",
                || search_index.ensure_index(),
                |e| e.is_transient(),
            )
            .await
            .context("unable to ensure search index exists")?;
        info!("document manager initialized");
        Ok(Self {
            storage,
            search_index,
            retry,
        })
    }

    /// Upload one document and index its record. When the index write
    /// fails after a successful upload the blob is left in place and the
    /// error is surfaced; there is no automatic rollback.
    pub async fn upload_and_index(
        &self,
        path: &Path,
        summary: Option<String>,
        keywords: Vec<String>,
    ) -> Result<DocumentRecord> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid document path: {}", path.display()))?
            .to_string();
        let content = extract::extract_text(path)
            .await
            .with_context(|| format!("unable to extract text from {}", path.display()))?;
        let file_size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("unable to stat {}", path.display()))?
            .len();

        let blob_url = self
            .storage
            .upload(path, None)
            .await
            .with_context(|| format!("unable to upload {}", path.display()))?;

        let extension = extract::file_extension(path);
        let record = DocumentRecord {
            id: document::document_id(&filename),
            content: document::truncate_content(content),
            file_type: if extension.is_empty() {
                String::new()
            } else {
                format!(".{extension}")
            },
            blob_url,
            summary: summary.unwrap_or_default(),
            keywords,
            upload_date: Utc::now(),
            file_size,
            filename,
        };

        let upsert = self
            .retry
            .run(
                "indexing document",
                || self.search_index.upsert(&record),
                |e| e.is_transient(),
            )
            .await;
        if let Err(e) = upsert {
            warn!(
                id = %record.id,
                blob_url = %record.blob_url,
                "index write failed after blob upload, blob left in place"
            );
            return Err(anyhow::Error::new(e)
                .context(format!("unable to index {}", record.filename)));
        }

        info!(id = %record.id, filename = %record.filename, "uploaded and indexed document");
        Ok(record)
    }

    /// Ingest every supported file directly inside `dir`. One file's
    /// failure never aborts the batch.
    pub async fn upload_and_index_directory(&self, dir: &Path) -> Result<BatchOutcome> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("directory not found: {}", dir.display()))?;
        let mut outcome = BatchOutcome::default();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            if !extract::is_supported(&path) {
                warn!(file = %filename, "skipping unsupported file type");
                outcome.skipped += 1;
                continue;
            }
            match self.upload_and_index(&path, None, Vec::new()).await {
                Ok(_) => outcome.successful.push(filename),
                Err(e) => {
                    error!(file = %filename, error = %e, "failed to upload and index document");
                    outcome.failed.push(filename);
                }
            }
        }
        info!(
            successful = outcome.successful.len(),
            failed = outcome.failed.len(),
            skipped = outcome.skipped,
            "directory ingestion complete"
        );
        Ok(outcome)
    }

    /// Free-text query, ranked by the backend. No match is an empty vec.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ScoredDocument>> {
        let results = self
            .retry
            .run(
                "searching documents",
                || self.search_index.search(query, max_results, None),
                |e| e.is_transient(),
            )
            .await?;
        Ok(results)
    }

    pub async fn get_document_info(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.search_index.get(id).await?)
    }

    /// Remove a record from the index. The blob keeps its own lifecycle.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(self.search_index.delete(id).await?)
    }

    pub async fn list_all_documents(&self) -> Result<Vec<BlobMetadata>> {
        Ok(self.storage.list().await?)
    }

    /// Fresh counts from both backends; nothing is cached.
    pub async fn get_statistics(&self) -> Result<Statistics> {
        let blobs = self.storage.list().await?;
        let index_count = self
            .retry
            .run(
                "counting indexed documents",
                || self.search_index.document_count(),
                |e| e.is_transient(),
            )
            .await?;
        Ok(Statistics {
            storage: StorageStatistics {
                document_count: blobs.len(),
                total_size_bytes: blobs.iter().map(|b| b.size_bytes).sum(),
            },
            search_index: IndexStatistics {
                document_count: index_count,
            },
        })
    }
}
