use thiserror::Error;

/// Errors raised by the copilot's clients and configuration.
///
/// None of these cross [`crate::SalesPipeline::answer`]: every stage turns them
/// into a sentinel value and a log line.
#[derive(Error, Debug)]
pub enum CopilotError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),
    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
    #[error("Prompt template `{name}` is missing placeholder {{{placeholder}}}")]
    Template {
        name: &'static str,
        placeholder: &'static str,
    },
    #[error("Query is empty")]
    EmptyQuery,
    #[error("Failed to build HTTP client: {0}")]
    HttpClientBuild(reqwest::Error),
    #[error("Failed to send request to the model provider: {0}")]
    ModelRequest(reqwest::Error),
    #[error("Model provider returned {status}: {body}")]
    ModelApi { status: u16, body: String },
    #[error("Failed to decode model response: {0}")]
    ModelDeserialization(String),
    #[error("Model returned an empty completion")]
    EmptyCompletion,
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Failed to send request to the vector index: {0}")]
    IndexRequest(reqwest::Error),
    #[error("Vector index returned {status}: {body}")]
    IndexApi { status: u16, body: String },
    #[error("Failed to decode vector index response: {0}")]
    IndexDeserialization(String),
    #[error("Failed to reach the retrieval assistant: {0}")]
    AssistantRequest(reqwest::Error),
    #[error("Retrieval assistant returned {status}: {body}")]
    AssistantApi { status: u16, body: String },
    #[error("Failed to decode retrieval assistant response: {0}")]
    AssistantDeserialization(String),
}

impl CopilotError {
    /// Configuration problems need operator action; retrying will not help.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CopilotError::ConfigLoad(_)
                | CopilotError::MissingConfig(_)
                | CopilotError::InvalidConfig { .. }
                | CopilotError::Template { .. }
        )
    }

    /// Connectivity and HTTP-status failures, as opposed to payload/schema failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CopilotError::ModelRequest(_)
                | CopilotError::ModelApi { .. }
                | CopilotError::IndexRequest(_)
                | CopilotError::IndexApi { .. }
                | CopilotError::AssistantRequest(_)
                | CopilotError::AssistantApi { .. }
        )
    }
}
