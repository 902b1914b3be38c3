// Core types and conversation loop for toolmux

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod provider;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Aggregator, CollisionRecord, RoutingTable};
pub use config::{OrchestratorConfig, ProviderLaunchSpec, TimeoutConfig};
pub use conversation::{ConversationState, Turn, TurnKind};
pub use error::{DispatchError, ModelError, OrchestratorError, ProviderError};
pub use llm::{GeminiClient, LanguageModel, ModelConfig, ModelReply};
pub use orchestrator::{Orchestrator, Phase};
pub use provider::{Connector, ProviderHandle, ToolProvider};
pub use types::*;
