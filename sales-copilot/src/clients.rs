//! Client handles shared by every request, built once at startup.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::CopilotError;
use crate::providers::{
    ChatModel, Embedder, IndexStats, OpenAiChatModel, PineconeIndex, RigEmbedder, VectorIndex,
};

const INDEX_CHECK_ATTEMPTS: u32 = 3;
const INDEX_CHECK_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Clients {
    pub http: Client,
    pub chat: Arc<dyn ChatModel>,
    pub embedder: Arc<dyn Embedder>,
    /// `None` in assistant mode
    pub index: Option<Arc<dyn VectorIndex>>,
}

impl Clients {
    pub fn from_settings(settings: &Settings) -> Result<Self, CopilotError> {
        let http = Client::builder()
            .user_agent(concat!("sales-copilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CopilotError::HttpClientBuild)?;

        let models = &settings.models;
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
            http.clone(),
            models.base_url.clone(),
            models.api_key.clone(),
            models.timeout,
        ));
        let embedder: Arc<dyn Embedder> = Arc::new(RigEmbedder::new(
            http.clone(),
            &models.base_url,
            &models.api_key,
            &models.embedding_model,
            models.timeout,
        )?);

        let index = match (&settings.index, &settings.pinecone_api_key) {
            (Some(index), Some(api_key)) => {
                info!(
                    host = %index.host,
                    index = index.name.as_deref().unwrap_or("-"),
                    "Vector index configured"
                );
                let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(
                    http.clone(),
                    &index.host,
                    api_key.clone(),
                    index.namespace.clone(),
                    models.timeout,
                ));
                Some(index)
            }
            _ => None,
        };

        Ok(Self {
            http,
            chat,
            embedder,
            index,
        })
    }

    /// Check the index answers, retrying with a growing pause. The index is
    /// kept even when every attempt fails.
    pub async fn check_index(&self) -> Option<IndexStats> {
        self.check_index_with(INDEX_CHECK_ATTEMPTS, INDEX_CHECK_BACKOFF)
            .await
    }

    async fn check_index_with(&self, attempts: u32, backoff: Duration) -> Option<IndexStats> {
        let index = self.index.as_ref()?;
        for attempt in 1..=attempts {
            match index.describe().await {
                Ok(stats) => {
                    info!(
                        total_vector_count = stats.total_vector_count,
                        dimension = ?stats.dimension,
                        attempt,
                        "Vector index is reachable"
                    );
                    return Some(stats);
                }
                Err(e) if attempt < attempts => {
                    warn!(error = %e, attempt, "Vector index check failed, retrying");
                    tokio::time::sleep(backoff * attempt).await;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempts,
                        "Vector index is unreachable, searches will degrade until it recovers"
                    );
                }
            }
        }
        None
    }
}
