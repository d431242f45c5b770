use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use super::Retriever;
use crate::error::CopilotError;
use crate::types::{
    ClassificationResult, Query, RetrievalResult, RetrievedPassage, UNKNOWN_SOURCE,
};

pub const DEFAULT_ASSISTANT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct AssistantRequest<'a> {
    messages: [AssistantTurn<'a>; 1],
    stream: bool,
    model: &'a str,
}

#[derive(Serialize)]
struct AssistantTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct AssistantResponse {
    message: AssistantMessage,
    #[serde(default)]
    citations: Vec<AssistantCitation>,
}

#[derive(Deserialize, Debug)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Debug)]
struct AssistantCitation {
    #[serde(default)]
    references: Vec<AssistantReference>,
}

#[derive(Deserialize, Debug)]
struct AssistantReference {
    #[serde(default)]
    file: AssistantFile,
}

/// Files may come back with only an id; such references still count.
#[derive(Deserialize, Debug, Default)]
struct AssistantFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    signed_url: Option<String>,
}

/// Delegates search and synthesis to a managed assistant endpoint. The
/// classification is informational only in this mode.
#[derive(Clone, Debug)]
pub struct DelegatedAssistantRetriever {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl DelegatedAssistantRetriever {
    /// `endpoint` is the full chat URL of the assistant. A missing `api_key`
    /// is reported on every call without touching the network.
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            timeout,
        }
    }

    pub async fn retrieve_via_assistant(
        &self,
        query: &Query,
    ) -> Result<RetrievalResult, CopilotError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(CopilotError::MissingConfig("PINECONE_API_KEY"))?;

        let body = AssistantRequest {
            messages: [AssistantTurn {
                role: "user",
                content: query.as_str(),
            }],
            stream: false,
            model: &self.model,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Api-Key", api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(CopilotError::AssistantRequest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CopilotError::AssistantApi {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response
            .text()
            .await
            .map_err(CopilotError::AssistantRequest)?;
        let parsed: AssistantResponse = serde_json::from_str(&raw)
            .map_err(|e| CopilotError::AssistantDeserialization(e.to_string()))?;

        Ok(into_result(parsed))
    }
}

/// One passage per referenced file, in citation order, repeated files folded
/// into their first occurrence.
fn into_result(response: AssistantResponse) -> RetrievalResult {
    let mut passages: Vec<RetrievedPassage> = Vec::new();
    for reference in response
        .citations
        .into_iter()
        .flat_map(|citation| citation.references)
    {
        let file = reference.file;
        let name = file
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
        let seen = passages
            .iter()
            .any(|p| p.source_name == name && p.source_url == file.signed_url);
        if !seen {
            passages.push(RetrievedPassage {
                source_name: name,
                source_url: file.signed_url,
                text: String::new(),
                relevance_score: None,
            });
        }
    }
    RetrievalResult::found(response.message.content, passages)
}

#[async_trait]
impl Retriever for DelegatedAssistantRetriever {
    fn requires_specialties(&self) -> bool {
        false
    }

    async fn retrieve(
        &self,
        query: &Query,
        _specialties: &ClassificationResult,
    ) -> RetrievalResult {
        match self.retrieve_via_assistant(query).await {
            Ok(result) => {
                info!(
                    citations = result.passages.len(),
                    status = ?result.status,
                    "Assistant retrieval completed"
                );
                result
            }
            Err(e) if e.is_configuration() => {
                error!(error = %e, "Assistant retrieval is not configured");
                RetrievalResult::misconfigured()
            }
            Err(e) if e.is_transport() => {
                warn!(error = %e, endpoint = %self.endpoint, "Could not reach the retrieval assistant");
                RetrievalResult::unavailable()
            }
            Err(e) => {
                error!(error = %e, "Retrieval assistant sent an unreadable response");
                RetrievalResult::unavailable()
            }
        }
    }
}
