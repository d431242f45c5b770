use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use crate::error::CopilotError;

pub const PINECONE_API_VERSION: &str = "2024-07";

/// Nearest-neighbour query restricted to a set of `specialty` values.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    /// Allowed `specialty` metadata values, already lower-cased
    pub specialties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IndexMatch {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub total_vector_count: u64,
}

/// A managed vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync + Debug {
    /// Matches in the index's own rank order.
    async fn query(&self, query: IndexQuery) -> Result<Vec<IndexMatch>, CopilotError>;

    /// Availability check used at startup.
    async fn describe(&self) -> Result<IndexStats, CopilotError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    vector: &'a [f32],
    top_k: usize,
    filter: Value,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

/// Pinecone data-plane client for one index host.
#[derive(Clone, Debug)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
    timeout: Duration,
}

impl PineconeIndex {
    pub fn new(
        client: Client,
        host: &str,
        api_key: impl Into<String>,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Self {
            client,
            host,
            api_key: api_key.into(),
            namespace,
            timeout,
        }
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &impl Serialize,
    ) -> Result<T, CopilotError> {
        let response = self
            .client
            .post(format!("{}/{route}", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(CopilotError::IndexRequest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CopilotError::IndexApi {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await.map_err(CopilotError::IndexRequest)?;
        serde_json::from_str(&raw).map_err(|e| CopilotError::IndexDeserialization(e.to_string()))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, query: IndexQuery) -> Result<Vec<IndexMatch>, CopilotError> {
        let body = QueryBody {
            vector: &query.vector,
            top_k: query.top_k,
            filter: json!({ "specialty": { "$in": query.specialties } }),
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        debug!(host = %self.host, top_k = query.top_k, "--> index query");
        let response: QueryResponse = self.post("query", &body).await?;
        debug!(matches = response.matches.len(), "<-- index query");
        Ok(response.matches)
    }

    async fn describe(&self) -> Result<IndexStats, CopilotError> {
        self.post("describe_index_stats", &json!({})).await
    }
}
