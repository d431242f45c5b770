use async_trait::async_trait;
use insight_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::{NO_CONTENT, NO_SPECIALTY, PipelineState, session_keys};
use crate::classifier::SpecialtyClassifier;
use crate::retriever::Retriever;
use crate::synthesizer::{NO_SPECIALTY_MARKER, SalesInsightSynthesizer, SynthesisRequest};
use crate::types::{ClassificationResult, Query, RetrievalResult};

/// Classifies the query into taxonomy labels.
pub struct ClassifyTask {
    classifier: Arc<SpecialtyClassifier>,
}

impl ClassifyTask {
    pub fn new(classifier: Arc<SpecialtyClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Task for ClassifyTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(state = ?PipelineState::Classifying, "running task: {}", self.id());

        let query: Query = context.require(session_keys::QUERY).await?;
        let specialties = self.classifier.classify(&query).await;
        context.set(session_keys::SPECIALTIES, &specialties).await?;

        let status = if specialties.is_empty() {
            "Nenhuma especialidade identificada".to_string()
        } else {
            format!("Especialidades identificadas: {}", specialties.joined_or(NO_SPECIALTY_MARKER))
        };
        Ok(TaskResult::new_with_status(None, NextAction::Continue, Some(status)))
    }
}

/// Runs the configured retrieval strategy.
pub struct RetrieveTask {
    retriever: Arc<dyn Retriever>,
}

impl RetrieveTask {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Task for RetrieveTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(state = ?PipelineState::Retrieving, "running task: {}", self.id());

        let query: Query = context.require(session_keys::QUERY).await?;
        let specialties: ClassificationResult = context
            .get(session_keys::SPECIALTIES)
            .await
            .unwrap_or_default();

        let retrieval = self.retriever.retrieve(&query, &specialties).await;
        let status = if retrieval.has_content() {
            format!(
                "Informações relevantes encontradas ({} fontes)",
                retrieval.passages.len()
            )
        } else {
            "Nenhuma informação relevante encontrada".to_string()
        };
        context.set(session_keys::RETRIEVAL, &retrieval).await?;

        Ok(TaskResult::new_with_status(None, NextAction::Continue, Some(status)))
    }
}

/// Writes the seller-facing insight. Always ends the run in `Done`.
pub struct SynthesizeTask {
    synthesizer: Arc<SalesInsightSynthesizer>,
}

impl SynthesizeTask {
    pub fn new(synthesizer: Arc<SalesInsightSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Task for SynthesizeTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(state = ?PipelineState::Synthesizing, "running task: {}", self.id());

        let query: Query = context.require(session_keys::QUERY).await?;
        let specialties: ClassificationResult = context
            .get(session_keys::SPECIALTIES)
            .await
            .unwrap_or_default();
        let retrieval: RetrievalResult = context.require(session_keys::RETRIEVAL).await?;

        let answer = self
            .synthesizer
            .synthesize(SynthesisRequest {
                query: &query,
                specialties: &specialties,
                retrieval: &retrieval,
            })
            .await;

        context.set(session_keys::STATE, PipelineState::Done).await?;
        Ok(TaskResult::new_with_status(
            Some(answer.into_inner()),
            NextAction::End,
            Some("Insight gerado".to_string()),
        ))
    }
}

/// Terminal: classification came back empty while retrieval needs it.
pub struct NoSpecialtyTask;

#[async_trait]
impl Task for NoSpecialtyTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(state = ?PipelineState::NoSpecialty, "running task: {}", self.id());
        context.set(session_keys::STATE, PipelineState::NoSpecialty).await?;
        Ok(TaskResult::new(Some(NO_SPECIALTY.to_string()), NextAction::End))
    }
}

/// Terminal: retrieval failed or found nothing.
pub struct NoContentTask;

#[async_trait]
impl Task for NoContentTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(state = ?PipelineState::NoContent, "running task: {}", self.id());
        context.set(session_keys::STATE, PipelineState::NoContent).await?;
        Ok(TaskResult::new(Some(NO_CONTENT.to_string()), NextAction::End))
    }
}
