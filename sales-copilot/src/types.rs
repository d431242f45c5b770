use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CopilotError;

/// Placeholder used when a passage has no course name.
pub const UNKNOWN_SOURCE: &str = "N/A";
/// Placeholder used when a passage has no link.
pub const MISSING_URL: &str = "#";

/// Content reported when the filtered search is skipped for lack of a specialty.
pub const CANNOT_SEARCH_MESSAGE: &str =
    "Não foi possível realizar a busca. Nenhuma especialidade identificada.";
/// Content reported when the knowledge base could not be reached.
pub const RETRIEVAL_ERROR_MESSAGE: &str = "Ocorreu um erro ao buscar na base de conhecimento.";

/// A salesperson's question. Only non-emptiness is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, CopilotError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CopilotError::EmptyQuery);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Taxonomy labels picked for a query. Empty means "could not classify".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationResult(Vec<String>);

impl ClassificationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Labels joined with `, `, or `none_marker` when nothing was classified.
    pub fn joined_or(&self, none_marker: &str) -> String {
        if self.0.is_empty() {
            none_marker.to_string()
        } else {
            self.0.join(", ")
        }
    }

    /// Lower-cased labels, matching how the index stores `specialty` metadata.
    pub fn metadata_filter_values(&self) -> Vec<String> {
        self.0.iter().map(|label| label.to_lowercase()).collect()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    /// Only the classifier may build non-empty results, so that every label is
    /// known to be a taxonomy member.
    pub(crate) fn from_checked(labels: Vec<String>) -> Self {
        Self(labels)
    }
}

/// One retrieved unit of knowledge with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub source_name: String,
    pub source_url: Option<String>,
    pub text: String,
    /// Engine-defined scale; display only. Absent for delegated retrieval.
    pub relevance_score: Option<f64>,
}

impl RetrievedPassage {
    pub fn citation(&self) -> Citation {
        Citation {
            course_name: self.source_name.clone(),
            source_url: self
                .source_url
                .clone()
                .unwrap_or_else(|| MISSING_URL.to_string()),
            score: self.relevance_score,
        }
    }
}

/// Provenance record handed to the synthesizer and to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub course_name: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    /// Passages were found
    Found,
    /// The search ran but returned nothing
    NoMatches,
    /// Filtered search skipped because classification was empty
    NoSpecialty,
    /// Credentials or endpoint not configured
    Misconfigured,
    /// Transport or payload failure
    Unavailable,
}

/// Request-scoped output of a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Aggregated passage text, in rank order
    pub rag_content: String,
    /// Passages in the same rank order as `rag_content`
    pub passages: Vec<RetrievedPassage>,
    pub status: RetrievalStatus,
}

impl RetrievalResult {
    pub fn found(rag_content: String, passages: Vec<RetrievedPassage>) -> Self {
        let status = if rag_content.trim().is_empty() {
            RetrievalStatus::NoMatches
        } else {
            RetrievalStatus::Found
        };
        Self {
            rag_content,
            passages,
            status,
        }
    }

    pub fn no_matches() -> Self {
        Self::failed(String::new(), RetrievalStatus::NoMatches)
    }

    pub fn cannot_search() -> Self {
        Self::failed(CANNOT_SEARCH_MESSAGE.to_string(), RetrievalStatus::NoSpecialty)
    }

    pub fn unavailable() -> Self {
        Self::failed(
            RETRIEVAL_ERROR_MESSAGE.to_string(),
            RetrievalStatus::Unavailable,
        )
    }

    pub fn misconfigured() -> Self {
        Self::failed(
            RETRIEVAL_ERROR_MESSAGE.to_string(),
            RetrievalStatus::Misconfigured,
        )
    }

    fn failed(rag_content: String, status: RetrievalStatus) -> Self {
        Self {
            rag_content,
            passages: Vec::new(),
            status,
        }
    }

    /// True when there is grounded content worth synthesizing from.
    pub fn has_content(&self) -> bool {
        self.status == RetrievalStatus::Found
    }

    pub fn citations(&self) -> Vec<Citation> {
        self.passages.iter().map(RetrievedPassage::citation).collect()
    }

    /// Citations as pretty JSON, non-ASCII characters kept as-is.
    pub fn citations_json(&self) -> String {
        serde_json::to_string_pretty(&self.citations()).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Markdown answer meant for direct display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalAnswer(String);

impl FinalAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FinalAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
