pub mod blob_storage;
pub mod document;
pub mod extract;
pub mod retry;
pub mod search_index;
pub mod server_config;
pub mod service;

#[cfg(test)]
mod test_util;

pub use {
    blob_storage::{BlobMetadata, DocumentStorage, StorageError},
    document::{DocumentRecord, ScoredDocument},
    search_index::{DocumentSearchIndex, IndexError, SearchIndex, SearchIndexTS},
    server_config::{ConfigurationError, ServerConfig},
    service::{BatchOutcome, DocumentManager, Statistics},
};
