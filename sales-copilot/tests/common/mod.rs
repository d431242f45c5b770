//! Shared doubles for the pipeline integration tests.
//!
//! Every double records how often it was called so tests can assert that a
//! short-circuited stage never ran.

// Not every test file uses every helper.
#![allow(unused)]

use async_trait::async_trait;
use sales_copilot::providers::{
    ChatModel, ChatRequest, Embedder, IndexMatch, IndexQuery, IndexStats, VectorIndex,
};
use sales_copilot::{
    CopilotError, FilteredVectorRetriever, PromptTemplate, Retriever, SalesInsightSynthesizer,
    SalesPipeline, SpecialtyClassifier, SpecialtyTaxonomy,
};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sales_copilot=debug,insight_flow=debug")
        .with_test_writer()
        .try_init();
}

/// Answers classification requests with a fixed payload.
#[derive(Debug)]
pub struct MockClassifierModel {
    payload: String,
    pub calls: AtomicUsize,
}

impl MockClassifierModel {
    pub fn returning(labels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            payload: json!({ "output": labels }).to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatModel for MockClassifierModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, CopilotError> {
        assert!(request.json_object, "classifier must ask for a JSON object");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// Synthesis double that only repeats the `Fonte:`/`Conteúdo:` lines it was
/// given, so its answer is grounded by construction. Fails on demand.
#[derive(Debug, Default)]
pub struct GroundedEchoModel {
    fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl GroundedEchoModel {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for GroundedEchoModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, CopilotError> {
        assert!(!request.json_object);
        assert_eq!(request.messages.len(), 1);
        let prompt = request.messages[0].content.clone();
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.fail {
            return Err(CopilotError::ModelApi {
                status: 503,
                body: "overloaded".into(),
            });
        }
        let grounded: Vec<&str> = prompt
            .lines()
            .filter(|line| line.starts_with("Fonte: ") || line.starts_with("Conteúdo: "))
            .collect();
        Ok(grounded.join("\n"))
    }
}

#[derive(Debug, Default)]
pub struct MockEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CopilotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// Index returning a fixed, ranked set of matches.
#[derive(Debug, Default)]
pub struct MockIndex {
    matches: Vec<IndexMatch>,
    pub queries: Mutex<Vec<IndexQuery>>,
}

impl MockIndex {
    pub fn with_matches(matches: Vec<IndexMatch>) -> Arc<Self> {
        Arc::new(Self {
            matches,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn query(&self, query: IndexQuery) -> Result<Vec<IndexMatch>, CopilotError> {
        self.queries.lock().unwrap().push(query);
        Ok(self.matches.clone())
    }

    async fn describe(&self) -> Result<IndexStats, CopilotError> {
        Ok(IndexStats {
            dimension: Some(3),
            total_vector_count: self.matches.len() as u64,
        })
    }
}

pub fn course_match(id: &str, score: f64, course: &str, text: &str, url: &str) -> IndexMatch {
    let mut metadata = Map::new();
    metadata.insert("course_name".into(), Value::from(course));
    metadata.insert("text".into(), Value::from(text));
    metadata.insert("source_url".into(), Value::from(url));
    IndexMatch {
        id: id.to_string(),
        score,
        metadata,
    }
}

pub fn pipeline_with(
    classifier_model: Arc<MockClassifierModel>,
    retriever: Arc<dyn Retriever>,
    synthesis_model: Arc<GroundedEchoModel>,
) -> SalesPipeline {
    let classifier = SpecialtyClassifier::new(
        classifier_model,
        "gpt-4o",
        SpecialtyTaxonomy::default(),
        &PromptTemplate::classifier().unwrap(),
    );
    let synthesizer = SalesInsightSynthesizer::new(
        synthesis_model,
        "gpt-4o",
        PromptTemplate::sales_coach().unwrap(),
    );
    SalesPipeline::new(Arc::new(classifier), retriever, Arc::new(synthesizer))
}

pub fn vector_retriever(embedder: Arc<MockEmbedder>, index: Arc<MockIndex>) -> Arc<dyn Retriever> {
    Arc::new(FilteredVectorRetriever::new(embedder, Some(index as Arc<dyn VectorIndex>), 5))
}
