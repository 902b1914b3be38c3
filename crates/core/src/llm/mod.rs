//! Language model boundary.
//!
//! The orchestrator only sees [`LanguageModel`]; [`GeminiClient`] is the
//! production implementation.

mod gemini;

pub use gemini::{GeminiClient, ModelConfig};

use crate::conversation::Turn;
use crate::error::ModelError;
use crate::types::{ToolDescriptor, ToolInvocation};

/// What the model decided to do with the conversation so far
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Final textual answer
    Text(String),
    /// One or more tool calls to run before asking again
    ToolCalls(Vec<ToolInvocation>),
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the full history plus the flattened tool catalog
    async fn generate(
        &self,
        history: &[Turn],
        catalog: &[ToolDescriptor],
    ) -> Result<ModelReply, ModelError>;
}
