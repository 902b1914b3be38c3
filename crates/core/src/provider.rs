// Seam between the routing layer and live provider sessions

use crate::error::ProviderError;
use crate::types::{ProviderId, ToolDescriptor, ToolResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::error::Elapsed;

/// A live session with one tool provider.
///
/// Implementations are pure pass-throughs: a call is sent exactly once and
/// never retried, since tools such as `execute-sql` are not idempotent.
#[async_trait::async_trait]
pub trait ToolProvider: Send + Sync {
    /// Request the provider's current catalog
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError>;

    /// Invoke one tool and wait for its matching response
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, ProviderError>;

    /// Invoke one tool with `limit` bounding the provider's own work.
    ///
    /// Sessions that queue calls behind a guard override this so that time
    /// spent waiting for an earlier call is not charged to this one.
    async fn call_tool_within(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        limit: Duration,
    ) -> Result<Result<ToolResult, ProviderError>, Elapsed> {
        tokio::time::timeout(limit, self.call_tool(name, arguments)).await
    }

    /// Whether the underlying session has gone away
    fn is_closed(&self) -> bool {
        false
    }

    /// Tear the session down (best effort)
    async fn close(&self) {}
}

/// A connected provider together with the catalog it reported
#[derive(Clone)]
pub struct ProviderHandle {
    pub provider_id: ProviderId,
    pub connection: Arc<dyn ToolProvider>,
    pub catalog: Vec<ToolDescriptor>,
}

impl ProviderHandle {
    pub fn new(provider_id: ProviderId, connection: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider_id,
            connection,
            catalog: Vec::new(),
        }
    }

    /// Re-query the provider and store the reported catalog.
    /// Returns the number of tools reported.
    pub async fn refresh_catalog(&mut self) -> Result<usize, ProviderError> {
        self.catalog = self.connection.list_tools().await?;
        Ok(self.catalog.len())
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.catalog.iter().map(|t| t.name.as_str()).collect()
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("provider_id", &self.provider_id)
            .field("tools", &self.tool_names())
            .field("closed", &self.connection.is_closed())
            .finish()
    }
}

/// Establishes (or re-establishes) sessions by provider id
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, provider_id: &ProviderId) -> Result<ProviderHandle, ProviderError>;
}
