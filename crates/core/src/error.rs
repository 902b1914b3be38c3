//! Error taxonomy for provider sessions, routing, and the conversation loop.

use crate::types::ProviderId;
use thiserror::Error;

/// Failures of a provider session. Each variant names the provider so
/// faults stay attributable once they are folded into the conversation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Process could not be started or the handshake did not complete
    #[error("provider '{provider}' unreachable: {reason}")]
    Unreachable { provider: ProviderId, reason: String },

    /// Malformed handshake, catalog, or response
    #[error("provider '{provider}' protocol error: {reason}")]
    Protocol { provider: ProviderId, reason: String },

    #[error("provider '{provider}' timed out after {elapsed_ms}ms")]
    Timeout { provider: ProviderId, elapsed_ms: u128 },

    #[error("provider '{provider}' disconnected")]
    Disconnected { provider: ProviderId },
}

impl ProviderError {
    pub fn provider(&self) -> &ProviderId {
        match self {
            Self::Unreachable { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Disconnected { provider } => provider,
        }
    }

    /// Whether the session should be considered dead after this error
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Disconnected { .. })
    }
}

/// Failures of `Aggregator::dispatch`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Failures talking to the language model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model request timed out")]
    Timeout,

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model kept requesting tools after {0} rounds")]
    ToolRoundLimit(usize),
}
