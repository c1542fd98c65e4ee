use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    document::{DocumentRecord, ScoredDocument},
    search_index::{IndexError, SearchIndex},
};

/// In-memory stand-in for the managed search backend, mirroring the
/// [`SearchIndex`] contract for facade tests.
#[derive(Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<HashMap<String, DocumentRecord>>,
    fail_upserts: AtomicBool,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index whose writes are rejected, for exercising the
    /// blob-uploaded/index-failed partial-failure path.
    pub fn failing_upserts() -> Self {
        Self {
            fail_upserts: AtomicBool::new(true),
            ..Default::default()
        }
    }
}

fn matches_query(record: &DocumentRecord, query: &str) -> bool {
    record.content.to_lowercase().contains(query)
        || record.filename.to_lowercase().contains(query)
        || record.summary.to_lowercase().contains(query)
        || record
            .keywords
            .iter()
            .any(|k| k.to_lowercase().contains(query))
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn ensure_index(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, record: &DocumentRecord) -> Result<(), IndexError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(IndexError::Rejected {
                status: 400,
                reason: "mapper_parsing_exception".to_string(),
            });
        }
        self.documents
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top: usize,
        _filter: Option<Value>,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        let query = query.to_lowercase();
        let documents = self.documents.lock().unwrap();
        let mut hits: Vec<ScoredDocument> = documents
            .values()
            .filter(|record| matches_query(record, &query))
            .map(|record| ScoredDocument {
                score: 1.0,
                document: record.clone(),
            })
            .collect();
        hits.truncate(top);
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, IndexError> {
        Ok(self.documents.lock().unwrap().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, IndexError> {
        Ok(self.documents.lock().unwrap().remove(id).is_some())
    }

    async fn document_count(&self) -> Result<u64, IndexError> {
        Ok(self.documents.lock().unwrap().len() as u64)
    }
}
