use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::Retriever;
use crate::providers::{Embedder, IndexMatch, IndexQuery, VectorIndex};
use crate::types::{
    ClassificationResult, Query, RetrievalResult, RetrievedPassage, UNKNOWN_SOURCE,
};

pub const DEFAULT_TOP_K: usize = 5;

/// Embeds the query and searches the index, restricted to the classified
/// specialties. Classification gates this strategy: with no specialty the
/// index is never called.
#[derive(Debug, Clone)]
pub struct FilteredVectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Option<Arc<dyn VectorIndex>>,
    top_k: usize,
}

impl FilteredVectorRetriever {
    /// `index` is `None` when the index could not be set up; every search then
    /// reports that it cannot run.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Option<Arc<dyn VectorIndex>>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }
}

/// Build the human-readable block and the passages, both in rank order.
pub fn aggregate_matches(matches: &[IndexMatch]) -> RetrievalResult {
    let mut rag_content = String::new();
    let mut passages = Vec::with_capacity(matches.len());

    for m in matches {
        let source_name = m
            .metadata_str("course_name")
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();
        let text = m.metadata_str("text").unwrap_or_default().to_string();
        rag_content.push_str(&format!("Fonte: {source_name}\nConteúdo: {text}\n\n"));

        passages.push(RetrievedPassage {
            source_name,
            source_url: m.metadata_str("source_url").map(str::to_string),
            text,
            relevance_score: Some(m.score),
        });
    }

    RetrievalResult::found(rag_content, passages)
}

#[async_trait]
impl Retriever for FilteredVectorRetriever {
    fn requires_specialties(&self) -> bool {
        true
    }

    async fn retrieve(
        &self,
        query: &Query,
        specialties: &ClassificationResult,
    ) -> RetrievalResult {
        let Some(index) = &self.index else {
            warn!("Vector index is not available, skipping search");
            return RetrievalResult::misconfigured();
        };
        if specialties.is_empty() {
            info!("No specialty to filter by, skipping search");
            return RetrievalResult::cannot_search();
        }

        let vector = match self.embedder.embed(query.as_str()).await {
            Ok(vector) => vector,
            Err(e) => {
                error!(error = %e, "Failed to embed query");
                return RetrievalResult::unavailable();
            }
        };

        let request = IndexQuery {
            vector,
            top_k: self.top_k,
            specialties: specialties.metadata_filter_values(),
        };
        let matches = match index.query(request).await {
            Ok(matches) => matches,
            Err(e) => {
                error!(error = %e, "Vector index query failed");
                return RetrievalResult::unavailable();
            }
        };

        info!(matches = matches.len(), top_k = self.top_k, "Vector search completed");
        if matches.is_empty() {
            return RetrievalResult::no_matches();
        }
        aggregate_matches(&matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopilotError;
    use crate::providers::IndexStats;
    use crate::types::RetrievalStatus;
    use serde_json::{Map, Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CopilotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CopilotError::Embedding("boom".into()));
            }
            Ok(vec![0.25; 4])
        }
    }

    #[derive(Debug, Default)]
    struct RecordingIndex {
        matches: Vec<IndexMatch>,
        queries: Mutex<Vec<IndexQuery>>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn query(&self, query: IndexQuery) -> Result<Vec<IndexMatch>, CopilotError> {
            self.queries.lock().unwrap().push(query);
            if self.fail {
                return Err(CopilotError::IndexApi {
                    status: 500,
                    body: "down".into(),
                });
            }
            Ok(self.matches.clone())
        }

        async fn describe(&self) -> Result<IndexStats, CopilotError> {
            Ok(IndexStats {
                dimension: Some(4),
                total_vector_count: self.matches.len() as u64,
            })
        }
    }

    fn index_match(id: &str, score: f64, metadata: Value) -> IndexMatch {
        let metadata: Map<String, Value> = match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        IndexMatch {
            id: id.to_string(),
            score,
            metadata,
        }
    }

    fn specialties(labels: &[&str]) -> ClassificationResult {
        ClassificationResult::from_checked(labels.iter().map(|l| l.to_string()).collect())
    }

    #[tokio::test]
    async fn empty_classification_never_touches_embedder_or_index() {
        let embedder = Arc::new(CountingEmbedder::default());
        let index = Arc::new(RecordingIndex::default());
        let retriever = FilteredVectorRetriever::new(embedder.clone(), Some(index.clone()), 5);

        let result = retriever
            .retrieve(&Query::new("oi").unwrap(), &ClassificationResult::empty())
            .await;

        assert_eq!(result.status, RetrievalStatus::NoSpecialty);
        assert!(!result.has_content());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(index.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_is_filtered_by_lowercased_specialties() {
        let embedder = Arc::new(CountingEmbedder::default());
        let index = Arc::new(RecordingIndex {
            matches: vec![index_match("1", 0.9, json!({"course_name": "Dor", "text": "t"}))],
            ..Default::default()
        });
        let retriever = FilteredVectorRetriever::new(embedder, Some(index.clone()), 3);

        retriever
            .retrieve(
                &Query::new("dor crônica").unwrap(),
                &specialties(&["Medicina da Dor", "Clínica Médica"]),
            )
            .await;

        let queries = index.queries.lock().unwrap();
        assert_eq!(queries[0].top_k, 3);
        assert_eq!(queries[0].specialties, vec!["medicina da dor", "clínica médica"]);
        assert_eq!(queries[0].vector, vec![0.25; 4]);
    }

    #[tokio::test]
    async fn citations_follow_content_rank_order() {
        let index = Arc::new(RecordingIndex {
            matches: vec![
                index_match(
                    "x",
                    0.91,
                    json!({"course_name": "Pós em Dor", "text": "Módulo de dor crônica.", "source_url": "https://cursos/dor"}),
                ),
                index_match(
                    "y",
                    0.87,
                    json!({"course_name": "Clínica Médica Avançada", "text": "Manejo ambulatorial."}),
                ),
                index_match("z", 0.42, json!({})),
            ],
            ..Default::default()
        });
        let retriever =
            FilteredVectorRetriever::new(Arc::new(CountingEmbedder::default()), Some(index), 5);

        let result = retriever
            .retrieve(&Query::new("dor").unwrap(), &specialties(&["Medicina da Dor"]))
            .await;

        assert!(result.has_content());
        assert_eq!(
            result.rag_content,
            "Fonte: Pós em Dor\nConteúdo: Módulo de dor crônica.\n\n\
             Fonte: Clínica Médica Avançada\nConteúdo: Manejo ambulatorial.\n\n\
             Fonte: N/A\nConteúdo: \n\n"
        );

        let names: Vec<String> = result.citations().into_iter().map(|c| c.course_name).collect();
        assert_eq!(names, vec!["Pós em Dor", "Clínica Médica Avançada", "N/A"]);
        let positions: Vec<usize> = names
            .iter()
            .map(|name| result.rag_content.find(&format!("Fonte: {name}\n")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let citations = result.citations();
        assert_eq!(citations[0].source_url, "https://cursos/dor");
        assert_eq!(citations[1].source_url, "#");
        assert_eq!(citations[0].score, Some(0.91));
        assert_eq!(citations[2].score, Some(0.42));
    }

    #[tokio::test]
    async fn failures_become_unavailable_results() {
        let failing_embedder = FilteredVectorRetriever::new(
            Arc::new(CountingEmbedder {
                fail: true,
                ..Default::default()
            }),
            Some(Arc::new(RecordingIndex::default())),
            5,
        );
        let result = failing_embedder
            .retrieve(&Query::new("q").unwrap(), &specialties(&["Pediatria"]))
            .await;
        assert_eq!(result.status, RetrievalStatus::Unavailable);

        let failing_index = FilteredVectorRetriever::new(
            Arc::new(CountingEmbedder::default()),
            Some(Arc::new(RecordingIndex {
                fail: true,
                ..Default::default()
            })),
            5,
        );
        let result = failing_index
            .retrieve(&Query::new("q").unwrap(), &specialties(&["Pediatria"]))
            .await;
        assert_eq!(result.status, RetrievalStatus::Unavailable);
        assert!(!result.has_content());
    }

    #[tokio::test]
    async fn no_matches_and_missing_index_are_not_content() {
        let empty = FilteredVectorRetriever::new(
            Arc::new(CountingEmbedder::default()),
            Some(Arc::new(RecordingIndex::default())),
            5,
        );
        let result = empty
            .retrieve(&Query::new("q").unwrap(), &specialties(&["Pediatria"]))
            .await;
        assert_eq!(result.status, RetrievalStatus::NoMatches);

        let without_index =
            FilteredVectorRetriever::new(Arc::new(CountingEmbedder::default()), None, 5);
        let result = without_index
            .retrieve(&Query::new("q").unwrap(), &specialties(&["Pediatria"]))
            .await;
        assert_eq!(result.status, RetrievalStatus::Misconfigured);
    }
}
