//! Retrieval strategies. Both turn a query into grounded content plus
//! citations and never fail past this boundary: problems come back as a
//! [`RetrievalResult`] whose status the orchestrator inspects.

pub mod assistant;
pub mod vector;

use async_trait::async_trait;

use crate::types::{ClassificationResult, Query, RetrievalResult};

pub use assistant::DelegatedAssistantRetriever;
pub use vector::FilteredVectorRetriever;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Whether an empty classification must stop the pipeline before retrieval.
    fn requires_specialties(&self) -> bool;

    async fn retrieve(&self, query: &Query, specialties: &ClassificationResult)
    -> RetrievalResult;
}
