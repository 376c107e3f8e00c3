//! Elasticsearch-compatible vector index.
//!
//! Writes one document per chunk with `PUT /<index>/_doc/<content_hash>`
//! and searches with the `knn` query:
//!
//! ```json
//! { "knn": { "field": "embedding", "query_vector": [...], "k": 10, "num_candidates": 10 },
//!   "size": 10 }
//! ```
//!
//! Hits are returned in the order the backend ranked them.

use anyhow::Result;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{json, Value};

use pdfchat_core::error::{RagError, Stage};
use pdfchat_core::models::{IndexRecord, ScoredChunk};
use pdfchat_core::store::{Indexer, Retriever, SearchParams};

use crate::config::IndexConfig;
use crate::http;

pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    name: String,
    vector_field: String,
    username: Option<String>,
    password_env: Option<String>,
}

impl ElasticIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config.url.trim_end_matches('/').to_string(),
            name: config.name.clone(),
            vector_field: config.vector_field.clone(),
            username: config.username.clone(),
            password_env: config.password_env.clone(),
        })
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.name, id)
    }

    fn search_url(&self) -> String {
        format!("{}/{}/_search", self.base_url, self.name)
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        stage: Stage,
    ) -> Result<reqwest::RequestBuilder, RagError> {
        let Some(username) = &self.username else {
            return Ok(request);
        };
        let password = match &self.password_env {
            Some(var) => Some(http::env_secret(stage, var)?),
            None => None,
        };
        Ok(request.basic_auth(username, password))
    }

    /// JSON body stored for one record.
    pub fn document_body(&self, record: &IndexRecord) -> Value {
        let mut body = json!({
            "content": record.chunk.content,
            "links": [record.chunk.source_ref],
            "offset": record.chunk.offset,
            "created_at": record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "updated_at": record.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        body[self.vector_field.as_str()] = json!(record.vector);
        body
    }

    /// JSON body of a nearest-neighbour query.
    pub fn search_body(&self, query: &[f64], params: &SearchParams) -> Value {
        json!({
            "knn": {
                "field": self.vector_field,
                "query_vector": query,
                "k": params.k,
                "num_candidates": params.num_candidates,
            },
            "size": params.k,
            "_source": ["content", "links", "offset"],
        })
    }
}

#[async_trait]
impl Indexer for ElasticIndex {
    async fn upsert(&self, record: &IndexRecord) -> Result<(), RagError> {
        let request = self
            .client
            .put(self.doc_url(record.id()))
            .json(&self.document_body(record));
        let response = self
            .authorize(request, Stage::Index)?
            .send()
            .await
            .map_err(|e| http::transport(Stage::Index, e))?;
        http::expect_success(Stage::Index, response).await?;
        tracing::debug!(id = record.id(), source = %record.chunk.source_ref, "indexed chunk");
        Ok(())
    }
}

#[async_trait]
impl Retriever for ElasticIndex {
    async fn search(
        &self,
        query: &[f64],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let request = self
            .client
            .post(self.search_url())
            .json(&self.search_body(query, params));
        let response = self
            .authorize(request, Stage::Search)?
            .send()
            .await
            .map_err(|e| http::transport(Stage::Search, e))?;
        let json = http::read_json(Stage::Search, response).await?;
        let mut hits = parse_search_response(&json)?;
        hits.truncate(params.k);
        Ok(hits)
    }
}

/// Map `hits.hits[]` to scored chunks, keeping the backend's order.
///
/// A hit without `_source.content` or a first `_source.links` entry is a
/// semantic failure; a missing `offset` reads as 0.
pub fn parse_search_response(json: &Value) -> Result<Vec<ScoredChunk>, RagError> {
    let hits = json
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(|h| h.as_array())
        .ok_or_else(|| RagError::semantic(Stage::Search, "response has no hits.hits array"))?;

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let source = hit.get("_source").ok_or_else(|| {
                RagError::semantic(Stage::Search, format!("hit {} has no _source", i))
            })?;
            let content = source
                .get("content")
                .and_then(|c| c.as_str())
                .ok_or_else(|| {
                    RagError::semantic(Stage::Search, format!("hit {} has no content", i))
                })?;
            let link = source
                .get("links")
                .and_then(|l| l.as_array())
                .and_then(|l| l.first())
                .and_then(|l| l.as_str())
                .ok_or_else(|| {
                    RagError::semantic(Stage::Search, format!("hit {} has no links", i))
                })?;
            let offset = source.get("offset").and_then(|o| o.as_u64()).unwrap_or(0);
            let score = hit.get("_score").and_then(|s| s.as_f64()).unwrap_or(0.0);
            Ok(ScoredChunk {
                source_ref: link.to_string(),
                offset: offset as usize,
                content: content.to_string(),
                score,
            })
        })
        .collect()
}
