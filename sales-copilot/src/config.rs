//! Process configuration, read once at startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, Map};
use serde::Deserialize;

use crate::error::CopilotError;
use crate::retriever::vector::DEFAULT_TOP_K;
use crate::taxonomy::SpecialtyTaxonomy;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_ASSISTANT_URL: &str = "https://prod-1-data.ke.pinecone.io/assistant/chat";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ASSISTANT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 180;

/// Which retriever the pipeline is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Filtered vector search; classification gates retrieval
    #[default]
    Vector,
    /// Managed assistant endpoint; classification is informational
    Assistant,
}

impl FromStr for RetrievalMode {
    type Err = CopilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" | "pinecone" => Ok(RetrievalMode::Vector),
            "assistant" | "delegated" => Ok(RetrievalMode::Assistant),
            other => Err(CopilotError::InvalidConfig {
                key: "RETRIEVAL_MODE",
                reason: format!("expected `vector` or `assistant`, got `{other}`"),
            }),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Vector => f.write_str("vector"),
            RetrievalMode::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_key: String,
    pub base_url: String,
    pub classifier_model: String,
    pub synthesis_model: String,
    pub embedding_model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub host: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Full chat URL, assistant name included
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub models: ModelSettings,
    pub retrieval_mode: RetrievalMode,
    /// Required in vector mode; in assistant mode a missing key degrades
    /// every retrieval instead of failing startup.
    pub pinecone_api_key: Option<String>,
    pub index: Option<IndexSettings>,
    pub assistant: Option<AssistantSettings>,
    pub taxonomy: SpecialtyTaxonomy,
    pub pipeline_timeout: Duration,
}

/// Raw process environment, keys lowercased by [`Environment`].
#[derive(Debug, Deserialize)]
struct RawSettings {
    openai_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    openai_base_url: String,
    #[serde(default = "default_chat_model")]
    classifier_model: String,
    #[serde(default = "default_chat_model")]
    synthesis_model: String,
    #[serde(default = "default_embedding_model")]
    embedding_model: String,
    model_timeout_secs: Option<String>,
    retrieval_mode: Option<String>,
    pinecone_api_key: Option<String>,
    pinecone_index_host: Option<String>,
    pinecone_index_name: Option<String>,
    pinecone_namespace: Option<String>,
    retrieval_top_k: Option<String>,
    #[serde(default = "default_assistant_url")]
    pinecone_assistant_url: String,
    pinecone_assistant_name: Option<String>,
    #[serde(default = "default_chat_model")]
    pinecone_assistant_model: String,
    assistant_timeout_secs: Option<String>,
    specialties: Option<String>,
    pipeline_timeout_secs: Option<String>,
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_assistant_url() -> String {
    DEFAULT_ASSISTANT_URL.to_string()
}

impl Settings {
    pub fn from_env() -> Result<Self, CopilotError> {
        Self::load(Environment::default().ignore_empty(true))
    }

    /// Same as [`Settings::from_env`], but reading from the given variables
    /// instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, CopilotError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::load(Environment::default().ignore_empty(true).source(Some(vars)))
    }

    fn load(environment: Environment) -> Result<Self, CopilotError> {
        let raw: RawSettings = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, CopilotError> {
        let models = ModelSettings {
            api_key: required("OPENAI_API_KEY", raw.openai_api_key)?,
            base_url: or_default(raw.openai_base_url, default_openai_base_url),
            classifier_model: or_default(raw.classifier_model, default_chat_model),
            synthesis_model: or_default(raw.synthesis_model, default_chat_model),
            embedding_model: or_default(raw.embedding_model, default_embedding_model),
            timeout: parse_secs(
                "MODEL_TIMEOUT_SECS",
                present(raw.model_timeout_secs),
                DEFAULT_MODEL_TIMEOUT_SECS,
            )?,
        };

        let retrieval_mode = match present(raw.retrieval_mode) {
            Some(value) => value.parse()?,
            None => RetrievalMode::default(),
        };
        let pinecone_api_key = present(raw.pinecone_api_key);

        let (index, assistant) = match retrieval_mode {
            RetrievalMode::Vector => {
                if pinecone_api_key.is_none() {
                    return Err(CopilotError::MissingConfig("PINECONE_API_KEY"));
                }
                let top_k = match present(raw.retrieval_top_k) {
                    Some(value) => parse_positive("RETRIEVAL_TOP_K", &value)?,
                    None => DEFAULT_TOP_K,
                };
                let index = IndexSettings {
                    host: required("PINECONE_INDEX_HOST", raw.pinecone_index_host)?,
                    name: present(raw.pinecone_index_name),
                    namespace: present(raw.pinecone_namespace),
                    top_k,
                };
                (Some(index), None)
            }
            RetrievalMode::Assistant => {
                let base = or_default(raw.pinecone_assistant_url, default_assistant_url);
                let name = required("PINECONE_ASSISTANT_NAME", raw.pinecone_assistant_name)?;
                let assistant = AssistantSettings {
                    endpoint: format!("{}/{}", base.trim_end_matches('/'), name),
                    model: or_default(raw.pinecone_assistant_model, default_chat_model),
                    timeout: parse_secs(
                        "ASSISTANT_TIMEOUT_SECS",
                        present(raw.assistant_timeout_secs),
                        DEFAULT_ASSISTANT_TIMEOUT_SECS,
                    )?,
                };
                (None, Some(assistant))
            }
        };

        let taxonomy = match present(raw.specialties) {
            Some(value) => SpecialtyTaxonomy::parse_list(&value)?,
            None => SpecialtyTaxonomy::default(),
        };

        Ok(Settings {
            models,
            retrieval_mode,
            pinecone_api_key,
            index,
            assistant,
            taxonomy,
            pipeline_timeout: parse_secs(
                "PIPELINE_TIMEOUT_SECS",
                present(raw.pipeline_timeout_secs),
                DEFAULT_PIPELINE_TIMEOUT_SECS,
            )?,
        })
    }
}

/// Whitespace-only values count as unset.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(key: &'static str, value: Option<String>) -> Result<String, CopilotError> {
    present(value).ok_or(CopilotError::MissingConfig(key))
}

fn or_default(value: String, default: fn() -> String) -> String {
    present(Some(value)).unwrap_or_else(default)
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, CopilotError> {
    match raw.parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CopilotError::InvalidConfig {
            key,
            reason: format!("expected a positive integer, got `{raw}`"),
        }),
    }
}

fn parse_secs(key: &'static str, raw: Option<String>, default: u64) -> Result<Duration, CopilotError> {
    match raw {
        Some(raw) => Ok(Duration::from_secs(parse_positive(key, &raw)? as u64)),
        None => Ok(Duration::from_secs(default)),
    }
}
