use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::CopilotError;
use crate::prompts::{self, PromptTemplate};
use crate::providers::{ChatMessage, ChatModel, ChatRequest};
use crate::taxonomy::SpecialtyTaxonomy;
use crate::types::{ClassificationResult, Query};

/// Shape of the classifier model's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationPayload {
    /// Top-level JSON array, e.g. `["Cardiologia"]`
    List(Vec<Value>),
    /// Object whose first list-valued entry holds the labels, e.g. `{"output": [...]}`
    Keyed { key: String, labels: Vec<Value> },
    /// Anything else, including text that is not JSON at all
    Malformed,
}

impl ClassificationPayload {
    pub fn parse(raw: &str) -> Self {
        // Some models wrap JSON in a markdown fence even in JSON mode
        let cleaned = raw.trim();
        let cleaned = cleaned
            .strip_prefix("```json")
            .or_else(|| cleaned.strip_prefix("```"))
            .map(|inner| inner.strip_suffix("```").unwrap_or(inner))
            .unwrap_or(cleaned)
            .trim();

        match serde_json::from_str::<Value>(cleaned) {
            Ok(Value::Array(items)) => ClassificationPayload::List(items),
            Ok(Value::Object(map)) => map
                .into_iter()
                .find_map(|(key, value)| match value {
                    Value::Array(labels) => Some(ClassificationPayload::Keyed { key, labels }),
                    _ => None,
                })
                .unwrap_or(ClassificationPayload::Malformed),
            _ => ClassificationPayload::Malformed,
        }
    }

    /// Keep only taxonomy members, in the model's order, without duplicates.
    pub fn into_result(self, taxonomy: &SpecialtyTaxonomy) -> ClassificationResult {
        let candidates = match self {
            ClassificationPayload::List(items) => items,
            ClassificationPayload::Keyed { labels, .. } => labels,
            ClassificationPayload::Malformed => return ClassificationResult::empty(),
        };

        let mut labels: Vec<String> = Vec::new();
        for candidate in &candidates {
            let Some(text) = candidate.as_str() else {
                continue;
            };
            match taxonomy.canonical(text) {
                Some(label) if !labels.iter().any(|known| known == label) => {
                    labels.push(label.to_string())
                }
                Some(_) => {}
                None => warn!(label = %text, "Classifier returned a label outside the taxonomy"),
            }
        }
        ClassificationResult::from_checked(labels)
    }
}

/// Maps a free-text question to taxonomy labels with a temperature-0 model call.
#[derive(Debug, Clone)]
pub struct SpecialtyClassifier {
    model: Arc<dyn ChatModel>,
    model_name: String,
    taxonomy: SpecialtyTaxonomy,
    system_prompt: String,
}

impl SpecialtyClassifier {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_name: impl Into<String>,
        taxonomy: SpecialtyTaxonomy,
        template: &PromptTemplate,
    ) -> Self {
        let specialties = taxonomy.to_prompt_list();
        let system_prompt = template.render(&[(prompts::SPECIALTIES, specialties.as_str())]);
        Self {
            model,
            model_name: model_name.into(),
            taxonomy,
            system_prompt,
        }
    }

    /// Never fails: any model or parse problem yields an empty result.
    pub async fn classify(&self, query: &Query) -> ClassificationResult {
        match self.try_classify(query).await {
            Ok(result) => {
                info!(specialties = ?result.labels(), "Query classified");
                result
            }
            Err(e) => {
                warn!(error = %e, "Classification failed, treating query as unclassified");
                ClassificationResult::empty()
            }
        }
    }

    async fn try_classify(&self, query: &Query) -> Result<ClassificationResult, CopilotError> {
        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(query.as_str()),
            ],
            temperature: 0.0,
            json_object: true,
        };

        let raw = self.model.complete(request).await?;
        let payload = ClassificationPayload::parse(&raw);
        if payload == ClassificationPayload::Malformed {
            warn!(raw = %raw, "Unexpected classifier payload");
        }
        Ok(payload.into_result(&self.taxonomy))
    }
}
