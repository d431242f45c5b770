//! The classify → retrieve → synthesize chain, run on an [`insight_flow::Graph`].
//!
//! The graph is built once per [`SalesPipeline`]; every call to
//! [`SalesPipeline::answer`] runs it with a fresh context, so nothing carries
//! over between queries.

mod tasks;

use insight_flow::{Context, Graph, GraphBuilder, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::classifier::SpecialtyClassifier;
use crate::clients::Clients;
use crate::config::{RetrievalMode, Settings};
use crate::error::CopilotError;
use crate::prompts::PromptTemplate;
use crate::retriever::{DelegatedAssistantRetriever, FilteredVectorRetriever, Retriever};
use crate::synthesizer::SalesInsightSynthesizer;
use crate::types::{Citation, ClassificationResult, Query, RetrievalResult};

pub use tasks::{ClassifyTask, NoContentTask, NoSpecialtyTask, RetrieveTask, SynthesizeTask};

pub const NO_SPECIALTY: &str =
    "Não foi possível identificar uma especialidade médica na sua pergunta.";
pub const NO_CONTENT: &str = "Não foi encontrado conteúdo relevante na base de conhecimento.";
pub const EMPTY_QUERY: &str = "Digite uma pergunta para receber um insight.";

/// Context keys shared by the pipeline tasks.
pub mod session_keys {
    pub const QUERY: &str = "query";
    pub const SPECIALTIES: &str = "specialties";
    pub const RETRIEVAL: &str = "retrieval";
    pub const STATE: &str = "pipeline_state";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Classifying,
    Retrieving,
    Synthesizing,
    Done,
    NoSpecialty,
    NoContent,
}

/// What a caller gets back for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightReport {
    /// Terminal state: `Done`, `NoSpecialty` or `NoContent`
    pub state: PipelineState,
    /// Markdown insight, or a diagnostic naming the stage that stopped the run
    pub answer: String,
    pub specialties: Vec<String>,
    pub citations: Vec<Citation>,
    /// Progress line of each executed step, in order
    pub steps: Vec<String>,
}

impl InsightReport {
    fn diagnostic(state: PipelineState, answer: &str) -> Self {
        Self {
            state,
            answer: answer.to_string(),
            specialties: Vec::new(),
            citations: Vec::new(),
            steps: Vec::new(),
        }
    }
}

pub struct SalesPipeline {
    graph: Graph,
}

impl SalesPipeline {
    pub fn new(
        classifier: Arc<SpecialtyClassifier>,
        retriever: Arc<dyn Retriever>,
        synthesizer: Arc<SalesInsightSynthesizer>,
    ) -> Self {
        let gated = retriever.requires_specialties();

        let classify = Arc::new(ClassifyTask::new(classifier));
        let classify_id = classify.id().to_string();
        let retrieve = Arc::new(RetrieveTask::new(retriever));
        let retrieve_id = retrieve.id().to_string();
        let synthesize = Arc::new(SynthesizeTask::new(synthesizer));
        let synthesize_id = synthesize.id().to_string();
        let no_specialty = Arc::new(NoSpecialtyTask);
        let no_specialty_id = no_specialty.id().to_string();
        let no_content = Arc::new(NoContentTask);
        let no_content_id = no_content.id().to_string();

        let graph = GraphBuilder::new("sales_insight")
            .add_task(classify)
            .add_task(retrieve)
            .add_task(synthesize)
            .add_task(no_specialty)
            .add_task(no_content)
            .add_conditional_edge(
                &classify_id,
                move |ctx| {
                    !gated
                        || ctx
                            .get_sync::<ClassificationResult>(session_keys::SPECIALTIES)
                            .is_some_and(|specialties| !specialties.is_empty())
                },
                &retrieve_id,
                &no_specialty_id,
            )
            .add_conditional_edge(
                &retrieve_id,
                |ctx| {
                    ctx.get_sync::<RetrievalResult>(session_keys::RETRIEVAL)
                        .is_some_and(|retrieval| retrieval.has_content())
                },
                &synthesize_id,
                &no_content_id,
            )
            .set_start_task(&classify_id)
            .build();

        Self { graph }
    }

    /// Wire the pipeline from startup configuration. Templates are validated
    /// here, so a broken prompt stops the process before the first request.
    pub fn from_settings(settings: &Settings, clients: &Clients) -> Result<Self, CopilotError> {
        let classifier = Arc::new(SpecialtyClassifier::new(
            clients.chat.clone(),
            settings.models.classifier_model.clone(),
            settings.taxonomy.clone(),
            &PromptTemplate::classifier()?,
        ));
        let synthesizer = Arc::new(SalesInsightSynthesizer::new(
            clients.chat.clone(),
            settings.models.synthesis_model.clone(),
            PromptTemplate::sales_coach()?,
        ));

        let retriever: Arc<dyn Retriever> = match settings.retrieval_mode {
            RetrievalMode::Vector => {
                let top_k = settings
                    .index
                    .as_ref()
                    .map(|index| index.top_k)
                    .ok_or(CopilotError::MissingConfig("PINECONE_INDEX_HOST"))?;
                Arc::new(FilteredVectorRetriever::new(
                    clients.embedder.clone(),
                    clients.index.clone(),
                    top_k,
                ))
            }
            RetrievalMode::Assistant => {
                let assistant = settings
                    .assistant
                    .as_ref()
                    .ok_or(CopilotError::MissingConfig("PINECONE_ASSISTANT_NAME"))?;
                Arc::new(DelegatedAssistantRetriever::new(
                    clients.http.clone(),
                    assistant.endpoint.clone(),
                    settings.pinecone_api_key.clone(),
                    assistant.model.clone(),
                    assistant.timeout,
                ))
            }
        };
        info!(mode = %settings.retrieval_mode, "Sales pipeline ready");

        Ok(Self::new(classifier, retriever, synthesizer))
    }

    /// Run the whole chain for one query. Never fails: every problem ends in
    /// a report whose `answer` is a diagnostic.
    #[instrument(skip(self, query), fields(query_chars = query.chars().count()))]
    pub async fn answer(&self, query: &str) -> InsightReport {
        let query = match Query::new(query) {
            Ok(query) => query,
            Err(_) => return InsightReport::diagnostic(PipelineState::NoSpecialty, EMPTY_QUERY),
        };

        let context = Context::new();
        if let Err(e) = context.set(session_keys::QUERY, &query).await {
            error!(error = %e, "Failed to seed pipeline context");
            return InsightReport::diagnostic(PipelineState::NoContent, NO_CONTENT);
        }

        let execution = match self.graph.execute(context.clone()).await {
            Ok(execution) => execution,
            Err(e) => {
                error!(error = %e, "Sales pipeline aborted");
                return InsightReport::diagnostic(PipelineState::NoContent, NO_CONTENT);
            }
        };

        let state = context
            .get(session_keys::STATE)
            .await
            .unwrap_or(PipelineState::NoContent);
        let specialties: ClassificationResult = context
            .get(session_keys::SPECIALTIES)
            .await
            .unwrap_or_default();
        let citations = context
            .get::<RetrievalResult>(session_keys::RETRIEVAL)
            .await
            .map(|retrieval| retrieval.citations())
            .unwrap_or_default();
        let steps = execution.status_messages();

        info!(state = ?state, steps = steps.len(), "Sales pipeline finished");
        InsightReport {
            state,
            answer: execution.response.unwrap_or_else(|| NO_CONTENT.to_string()),
            specialties: specialties.into_inner(),
            citations,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopilotError;
    use crate::providers::{ChatModel, ChatRequest};
    use crate::synthesizer::SYNTHESIS_FALLBACK;
    use crate::taxonomy::SpecialtyTaxonomy;
    use crate::types::RetrievedPassage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers the classifier (JSON mode) and the synthesizer from fixed strings.
    #[derive(Debug)]
    struct ScriptedModel {
        classification: &'static str,
        synthesis: Option<&'static str>,
        synthesis_calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: ChatRequest) -> Result<String, CopilotError> {
            if request.json_object {
                return Ok(self.classification.to_string());
            }
            self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
            self.synthesis
                .map(str::to_string)
                .ok_or(CopilotError::EmptyCompletion)
        }
    }

    struct FixedRetriever {
        gated: bool,
        result: RetrievalResult,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        fn requires_specialties(&self) -> bool {
            self.gated
        }

        async fn retrieve(&self, _query: &Query, specialties: &ClassificationResult) -> RetrievalResult {
            self.seen.lock().unwrap().push(specialties.labels().to_vec());
            self.result.clone()
        }
    }

    fn found() -> RetrievalResult {
        RetrievalResult::found(
            "Fonte: Pós em Cardiologia\nConteúdo: Módulo de arritmias.\n\n".into(),
            vec![RetrievedPassage {
                source_name: "Pós em Cardiologia".into(),
                source_url: Some("https://cursos/cardio".into()),
                text: "Módulo de arritmias.".into(),
                relevance_score: Some(0.8),
            }],
        )
    }

    fn pipeline(
        classification: &'static str,
        synthesis: Option<&'static str>,
        retriever: Arc<FixedRetriever>,
    ) -> (SalesPipeline, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel {
            classification,
            synthesis,
            synthesis_calls: AtomicUsize::new(0),
        });
        let classifier = Arc::new(SpecialtyClassifier::new(
            model.clone(),
            "gpt-4o",
            SpecialtyTaxonomy::default(),
            &PromptTemplate::classifier().unwrap(),
        ));
        let synthesizer = Arc::new(SalesInsightSynthesizer::new(
            model.clone(),
            "gpt-4o",
            PromptTemplate::sales_coach().unwrap(),
        ));
        (SalesPipeline::new(classifier, retriever, synthesizer), model)
    }

    fn retriever(gated: bool, result: RetrievalResult) -> Arc<FixedRetriever> {
        Arc::new(FixedRetriever {
            gated,
            result,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn happy_path_reaches_done() {
        let retriever = retriever(true, found());
        let (pipeline, _) = pipeline(r#"{"output": ["Cardiologia"]}"#, Some("## Insight"), retriever.clone());

        let report = pipeline.answer("Tem pós de cardio?").await;

        assert_eq!(report.state, PipelineState::Done);
        assert_eq!(report.answer, "## Insight");
        assert_eq!(report.specialties, vec!["Cardiologia".to_string()]);
        assert_eq!(report.citations.len(), 1);
        assert_eq!(report.citations[0].course_name, "Pós em Cardiologia");
        assert_eq!(
            report.steps,
            vec![
                "Especialidades identificadas: Cardiologia".to_string(),
                "Informações relevantes encontradas (1 fontes)".to_string(),
                "Insight gerado".to_string(),
            ]
        );
        assert_eq!(*retriever.seen.lock().unwrap(), vec![vec!["Cardiologia".to_string()]]);
    }

    #[tokio::test]
    async fn empty_classification_stops_gated_pipeline() {
        let retriever = retriever(true, found());
        let (pipeline, model) = pipeline(r#"{"output": []}"#, Some("## Insight"), retriever.clone());

        let report = pipeline.answer("oi").await;

        assert_eq!(report.state, PipelineState::NoSpecialty);
        assert_eq!(report.answer, NO_SPECIALTY);
        assert!(retriever.seen.lock().unwrap().is_empty());
        assert_eq!(model.synthesis_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delegated_mode_retrieves_without_specialties() {
        let retriever = retriever(false, found());
        let (pipeline, _) = pipeline("not json", Some("## Insight"), retriever.clone());

        let report = pipeline.answer("Quanto custa a pós?").await;

        assert_eq!(report.state, PipelineState::Done);
        assert!(report.specialties.is_empty());
        assert_eq!(*retriever.seen.lock().unwrap(), vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn failed_retrieval_ends_in_no_content() {
        let retriever = retriever(true, RetrievalResult::unavailable());
        let (pipeline, model) = pipeline(r#"["Cardiologia"]"#, Some("## Insight"), retriever);

        let report = pipeline.answer("Tem pós de cardio?").await;

        assert_eq!(report.state, PipelineState::NoContent);
        assert_eq!(report.answer, NO_CONTENT);
        assert!(report.citations.is_empty());
        assert_eq!(model.synthesis_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_still_reaches_done() {
        let retriever = retriever(true, found());
        let (pipeline, _) = pipeline(r#"["Cardiologia"]"#, None, retriever);

        let report = pipeline.answer("Tem pós de cardio?").await;

        assert_eq!(report.state, PipelineState::Done);
        assert_eq!(report.answer, SYNTHESIS_FALLBACK);
    }

    #[tokio::test]
    async fn blank_query_is_answered_with_a_diagnostic() {
        let retriever = retriever(true, found());
        let (pipeline, model) = pipeline(r#"["Cardiologia"]"#, Some("## Insight"), retriever.clone());

        let report = pipeline.answer("   ").await;

        assert_eq!(report.answer, EMPTY_QUERY);
        assert!(report.steps.is_empty());
        assert!(retriever.seen.lock().unwrap().is_empty());
        assert_eq!(model.synthesis_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn report_serializes_state_in_snake_case() {
        let report = InsightReport::diagnostic(PipelineState::NoSpecialty, NO_SPECIALTY);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "no_specialty");
        assert_eq!(json["steps"], serde_json::json!([]));
    }
}
