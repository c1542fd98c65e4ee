use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cert::CertificateValidation,
    http::{
        transport::{SingleNodeConnectionPool, TransportBuilder},
        StatusCode,
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    CountParts, DeleteParts, GetParts, IndexParts, OpenSearch, SearchParts,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::document::{DocumentRecord, ScoredDocument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unable to create search client: {0}")]
    Client(String),

    #[error("search backend transport error: {0}")]
    Transport(#[from] opensearch::Error),

    #[error("search backend rejected the request: {status} {reason}")]
    Rejected { status: u16, reason: String },

    #[error("unable to parse search backend response: {0}")]
    InvalidResponse(String),
}

impl IndexError {
    /// Network-level failures are worth retrying; rejections and malformed
    /// responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Transport(e) => e.status_code().is_none(),
            _ => false,
        }
    }
}

pub type SearchIndexTS = Arc<dyn SearchIndex + Sync + Send>;

/// The index-side contract: schema management plus document CRUD and
/// free-text query against the managed search backend.
#[async_trait]
pub trait SearchIndex {
    async fn ensure_index(&self) -> Result<(), IndexError>;
    async fn upsert(&self, record: &DocumentRecord) -> Result<(), IndexError>;
    async fn search(
        &self,
        query: &str,
        top: usize,
        filter: Option<Value>,
    ) -> Result<Vec<ScoredDocument>, IndexError>;
    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, IndexError>;
    async fn delete(&self, id: &str) -> Result<bool, IndexError>;
    async fn document_count(&self) -> Result<u64, IndexError>;
}

/// OpenSearch-backed document index.
pub struct DocumentSearchIndex {
    client: OpenSearch,
    index_name: String,
}

impl DocumentSearchIndex {
    pub fn new(endpoint: &str, api_key: &str, index_name: &str) -> Result<Self, IndexError> {
        let url = Url::parse(endpoint)
            .map_err(|e| IndexError::Client(format!("unable to parse endpoint {endpoint}: {e}")))?;
        let credentials = Credentials::Bearer(api_key.to_string());
        let transport = TransportBuilder::new(SingleNodeConnectionPool::new(url))
            .auth(credentials)
            .cert_validation(CertificateValidation::None)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IndexError::Client(format!("unable to create transport: {e}")))?;
        Ok(Self {
            client: OpenSearch::new(transport),
            index_name: index_name.to_string(),
        })
    }

    async fn rejected(response: opensearch::http::response::Response) -> IndexError {
        let status = response.status_code().as_u16();
        let reason = response.text().await.unwrap_or_default();
        IndexError::Rejected { status, reason }
    }
}

/// Field mapping for the document index. Free-text fields are analyzed;
/// everything else is keyword/numeric for filtering and faceting.
fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "filename": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "content": { "type": "text", "analyzer": "english" },
                "file_type": { "type": "keyword" },
                "upload_date": { "type": "date" },
                "file_size": { "type": "long" },
                "blob_url": { "type": "keyword" },
                "summary": { "type": "text" },
                "keywords": { "type": "keyword" }
            }
        }
    })
}

fn parse_hits(body: &Value) -> Result<Vec<ScoredDocument>, IndexError> {
    let hits = body["hits"]["hits"].as_array().ok_or_else(|| {
        IndexError::InvalidResponse("missing hits in search response".to_string())
    })?;
    let mut documents = Vec::with_capacity(hits.len());
    for hit in hits {
        let document: DocumentRecord =
            serde_json::from_value(hit["_source"].clone()).map_err(|e| {
                IndexError::InvalidResponse(format!("malformed search hit: {e}"))
            })?;
        let score = hit["_score"].as_f64().unwrap_or(0.0) as f32;
        documents.push(ScoredDocument { score, document });
    }
    Ok(documents)
}

#[async_trait]
impl SearchIndex for DocumentSearchIndex {
    /// Create the index with the fixed mapping if it is absent; no-op when
    /// it already exists.
    async fn ensure_index(&self) -> Result<(), IndexError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await?;
        if exists.status_code() == StatusCode::OK {
            info!(index = %self.index_name, "search index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_name))
            .body(index_mapping())
            .send()
            .await?;
        if response.status_code().is_success() {
            info!(index = %self.index_name, "created search index");
            return Ok(());
        }
        // Another writer can create the index between the exists check and
        // the create call.
        if response.status_code() == StatusCode::BAD_REQUEST {
            let body = response.json::<Value>().await?;
            if body["error"]["type"].as_str() == Some("resource_already_exists_exception") {
                info!(index = %self.index_name, "search index already exists");
                return Ok(());
            }
            return Err(IndexError::Rejected {
                status: StatusCode::BAD_REQUEST.as_u16(),
                reason: body["error"]["reason"].as_str().unwrap_or_default().to_string(),
            });
        }
        Err(Self::rejected(response).await)
    }

    async fn upsert(&self, record: &DocumentRecord) -> Result<(), IndexError> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index_name, &record.id))
            .body(record)
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(Self::rejected(response).await);
        }
        info!(id = %record.id, filename = %record.filename, "indexed document");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top: usize,
        filter: Option<Value>,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        let mut body = json!({
            "size": top,
            "query": {
                "bool": {
                    "must": [{
                        "multi_match": {
                            "query": query,
                            "fields": ["filename^2", "content", "summary", "keywords"]
                        }
                    }]
                }
            }
        });
        if let Some(filter) = filter {
            body["query"]["bool"]["filter"] = filter;
        }

        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(Self::rejected(response).await);
        }
        let body = response.json::<Value>().await?;
        parse_hits(&body)
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, IndexError> {
        let response = self
            .client
            .get(GetParts::IndexId(&self.index_name, id))
            .send()
            .await?;
        if response.status_code() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            return Err(Self::rejected(response).await);
        }
        let body = response.json::<Value>().await?;
        let record = serde_json::from_value(body["_source"].clone())
            .map_err(|e| IndexError::InvalidResponse(format!("malformed document: {e}")))?;
        Ok(Some(record))
    }

    async fn delete(&self, id: &str) -> Result<bool, IndexError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(&self.index_name, id))
            .send()
            .await?;
        if response.status_code() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status_code().is_success() {
            return Err(Self::rejected(response).await);
        }
        info!(id = %id, "deleted document from index");
        Ok(true)
    }

    async fn document_count(&self) -> Result<u64, IndexError> {
        let response = self
            .client
            .count(CountParts::Index(&[&self.index_name]))
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(Self::rejected(response).await);
        }
        let body = response.json::<Value>().await?;

        #[derive(Deserialize)]
        struct CountResponse {
            count: u64,
        }

        let result: CountResponse = serde_json::from_value(body)
            .map_err(|e| IndexError::InvalidResponse(format!("malformed count response: {e}")))?;
        Ok(result.count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(id: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            filename: format!("{id}.txt"),
            content: "This is a contract.".to_string(),
            file_type: ".txt".to_string(),
            blob_url: format!("memory:///legal-documents/{id}.txt"),
            summary: "Test".to_string(),
            keywords: vec!["contract".to_string()],
            upload_date: Utc::now(),
            file_size: 19,
        }
    }

    #[test]
    fn mapping_covers_every_record_field() {
        let mapping = index_mapping();
        let properties = &mapping["mappings"]["properties"];
        for field in [
            "id",
            "filename",
            "content",
            "file_type",
            "upload_date",
            "file_size",
            "blob_url",
            "summary",
            "keywords",
        ] {
            assert!(
                !properties[field].is_null(),
                "field {field} missing from mapping"
            );
        }
    }

    #[test]
    fn parse_hits_extracts_scores_and_sources() {
        let source = serde_json::to_value(record("contract")).unwrap();
        let body = json!({
            "hits": {
                "hits": [
                    { "_id": "contract", "_score": 1.42, "_source": source }
                ]
            }
        });
        let hits = parse_hits(&body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "contract");
        assert!((hits[0].score - 1.42).abs() < 1e-6);
    }

    #[test]
    fn parse_hits_of_empty_result_is_empty() {
        let body = json!({ "hits": { "hits": [] } });
        assert!(parse_hits(&body).unwrap().is_empty());
    }

    #[test]
    fn parse_hits_rejects_malformed_body() {
        let body = json!({ "took": 3 });
        assert!(matches!(
            parse_hits(&body).unwrap_err(),
            IndexError::InvalidResponse(_)
        ));
    }

    // Live tests against a local OpenSearch at https://localhost:9200.
    mod live {
        use super::*;

        const TEST_INDEX_NAME: &str = "legalindex-test";

        fn initialize_index() -> DocumentSearchIndex {
            DocumentSearchIndex::new("https://localhost:9200", "admin", TEST_INDEX_NAME).unwrap()
        }

        #[tokio::test]
        #[ignore]
        async fn upsert_get_delete_roundtrip() {
            let index = initialize_index();
            index.ensure_index().await.unwrap();

            let record = record("contract");
            index.upsert(&record).await.unwrap();

            let fetched = index.get("contract").await.unwrap().unwrap();
            assert_eq!(fetched.filename, "contract.txt");
            assert_eq!(fetched.summary, "Test");

            assert!(index.delete("contract").await.unwrap());
            assert!(!index.delete("contract").await.unwrap());
            assert!(index.get("contract").await.unwrap().is_none());
        }

        #[tokio::test]
        #[ignore]
        async fn search_waits_for_refresh() {
            let index = initialize_index();
            index.ensure_index().await.unwrap();
            index.upsert(&record("lease")).await.unwrap();

            // The index API acknowledges before the document is visible to
            // queries, so poll the count until it lands.
            const MAX_MILLIS_TO_WAIT: u64 = 2000;
            let mut millis_spent_waiting: u64 = 0;
            loop {
                if index.document_count().await.unwrap() >= 1 {
                    break;
                }
                assert!(
                    millis_spent_waiting < MAX_MILLIS_TO_WAIT,
                    "timed out waiting for document to be indexed"
                );
                tokio::time::sleep(Duration::from_millis(10)).await;
                millis_spent_waiting += 10;
            }

            let results = index.search("contract", 10, None).await.unwrap();
            assert!(!results.is_empty());
            index.delete("lease").await.unwrap();
        }
    }
}
