pub mod embedding;
pub mod openai;
pub mod pinecone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::CopilotError;

pub use embedding::RigEmbedder;
pub use openai::OpenAiChatModel;
pub use pinecone::{IndexMatch, IndexQuery, IndexStats, PineconeIndex, VectorIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    /// Ask the provider for a single JSON object
    pub json_object: bool,
}

/// A chat-completion capable language model.
#[async_trait]
pub trait ChatModel: Send + Sync + Debug {
    /// Returns the text of the first choice.
    async fn complete(&self, request: ChatRequest) -> Result<String, CopilotError>;
}

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CopilotError>;
}
