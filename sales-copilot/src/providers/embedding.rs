use async_trait::async_trait;
use reqwest::Client;
use rig::client::EmbeddingsClient;
use rig::embeddings::EmbeddingModel;
use rig::providers::openai;
use std::fmt;
use std::time::Duration;
use tracing::info;

use super::Embedder;
use crate::error::CopilotError;

/// Query embedder backed by rig's OpenAI embedding model.
#[derive(Clone)]
pub struct RigEmbedder {
    model: openai::EmbeddingModel,
    model_name: String,
    timeout: Duration,
}

impl RigEmbedder {
    /// `base_url` is the same OpenAI-compatible root the chat model uses,
    /// e.g. `https://api.openai.com/v1`.
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: &str,
        model_name: &str,
        timeout: Duration,
    ) -> Result<Self, CopilotError> {
        let base_url = base_url.trim_end_matches('/');
        let client = openai::Client::builder(api_key)
            .base_url(base_url)
            .custom_client(client)
            .build()
            .map_err(|e| CopilotError::InvalidConfig {
                key: "OPENAI_BASE_URL",
                reason: e.to_string(),
            })?;
        Ok(Self {
            model: client.embedding_model(model_name),
            model_name: model_name.to_string(),
            timeout,
        })
    }
}

impl fmt::Debug for RigEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RigEmbedder")
            .field("model_name", &self.model_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CopilotError> {
        let embedding = tokio::time::timeout(self.timeout, self.model.embed_text(text))
            .await
            .map_err(|_| {
                CopilotError::Embedding(format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| CopilotError::Embedding(e.to_string()))?;

        info!(
            model = %self.model_name,
            dimension = embedding.vec.len(),
            "Query embedded"
        );
        Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedder(server: &MockServer) -> RigEmbedder {
        RigEmbedder::new(
            Client::new(),
            &format!("{}/v1/", server.uri()),
            "sk-proxy",
            "text-embedding-3-small",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embeds_through_the_configured_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-proxy"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": ["dor crônica"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"object": "embedding", "embedding": [0.5, -0.25, 1.0], "index": 0}],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vector = embedder(&server).embed("dor crônica").await.unwrap();
        assert_eq!(vector, vec![0.5, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn provider_errors_become_embedding_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "invalid api key"
            })))
            .mount(&server)
            .await;

        let err = embedder(&server).embed("dor crônica").await.unwrap_err();
        assert!(matches!(err, CopilotError::Embedding(_)));
    }
}
