//! Grounded sales insights over a medical-education course catalog.
//!
//! A salesperson's question is classified into catalog specialties,
//! grounded in retrieved course content and turned into advice for the
//! seller. See [`SalesPipeline`] for the entry point.

pub mod classifier;
pub mod clients;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod retriever;
pub mod synthesizer;
pub mod taxonomy;
pub mod types;

pub use classifier::{ClassificationPayload, SpecialtyClassifier};
pub use clients::Clients;
pub use crate::config::{RetrievalMode, Settings};
pub use error::CopilotError;
pub use pipeline::{InsightReport, PipelineState, SalesPipeline};
pub use prompts::PromptTemplate;
pub use retriever::{DelegatedAssistantRetriever, FilteredVectorRetriever, Retriever};
pub use synthesizer::{SalesInsightSynthesizer, SynthesisRequest};
pub use taxonomy::SpecialtyTaxonomy;
pub use types::{
    Citation, ClassificationResult, FinalAnswer, Query, RetrievalResult, RetrievalStatus,
    RetrievedPassage,
};
