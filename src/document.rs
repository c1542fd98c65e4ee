use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters stored in the indexed `content` field.
/// Managed search services cap string field sizes at a few tens of
/// thousands of characters; anything longer is truncated, never rejected.
pub const MAX_CONTENT_CHARS: usize = 32_000;

/// The searchable representation of an uploaded document. The blob itself
/// lives in storage; `blob_url` is a foreign pointer with an independent
/// lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub content: String,
    pub file_type: String,
    pub blob_url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub upload_date: DateTime<Utc>,
    pub file_size: u64,
}

/// A search hit: the stored record annotated with the backend's relevance
/// score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub score: f32,
    pub document: DocumentRecord,
}

/// Derive the stable index id for a filename: the extension is dropped and
/// every character outside `[A-Za-z0-9_-]` becomes `_`. `contract.txt`
/// maps to `contract`; re-uploading the same filename overwrites the same
/// record.
pub fn document_id(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    let mut id: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        id.push('_');
    }
    id
}

/// Cap content at [`MAX_CONTENT_CHARS`] characters, cutting on a char
/// boundary.
pub fn truncate_content(content: String) -> String {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((byte_idx, _)) => {
            let mut truncated = content;
            truncated.truncate(byte_idx);
            truncated
        }
        None => content,
    }
}
