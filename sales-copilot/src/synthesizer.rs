use std::sync::Arc;
use tracing::{error, info};

use crate::prompts::{self, PromptTemplate};
use crate::providers::{ChatMessage, ChatModel, ChatRequest};
use crate::types::{ClassificationResult, FinalAnswer, Query, RetrievalResult};

/// Returned whenever the final model call fails.
pub const SYNTHESIS_FALLBACK: &str = "Não foi possível gerar o insight. Tente novamente.";
/// Stands in for the specialty list when classification came back empty.
pub const NO_SPECIALTY_MARKER: &str = "nenhuma";
/// Low but non-zero, for natural phrasing without invention.
pub const SYNTHESIS_TEMPERATURE: f64 = 0.3;

/// Everything the final instruction is built from. Immutable once built.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub query: &'a Query,
    pub specialties: &'a ClassificationResult,
    pub retrieval: &'a RetrievalResult,
}

impl SynthesisRequest<'_> {
    pub fn render(&self, template: &PromptTemplate) -> String {
        let specialties = self.specialties.joined_or(NO_SPECIALTY_MARKER);
        let citations = self.retrieval.citations_json();
        template.render(&[
            (prompts::SPECIALTIES, specialties.as_str()),
            (prompts::USER_QUERY, self.query.as_str()),
            (prompts::RAG_CONTENT, self.retrieval.rag_content.as_str()),
            (prompts::CITATIONS, citations.as_str()),
        ])
    }
}

/// Produces the grounded, seller-facing answer.
#[derive(Debug, Clone)]
pub struct SalesInsightSynthesizer {
    model: Arc<dyn ChatModel>,
    model_name: String,
    template: PromptTemplate,
}

impl SalesInsightSynthesizer {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_name: impl Into<String>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            template,
        }
    }

    /// Never fails: a model error yields [`SYNTHESIS_FALLBACK`].
    pub async fn synthesize(&self, request: SynthesisRequest<'_>) -> FinalAnswer {
        // The whole context travels in one system message; there is no user turn
        let chat = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage::system(request.render(&self.template))],
            temperature: SYNTHESIS_TEMPERATURE,
            json_object: false,
        };

        match self.model.complete(chat).await {
            Ok(answer) => {
                info!(chars = answer.len(), "Sales insight generated");
                FinalAnswer::new(answer)
            }
            Err(e) => {
                error!(error = %e, "Failed to generate sales insight");
                FinalAnswer::new(SYNTHESIS_FALLBACK)
            }
        }
    }
}
