//! Tool catalog aggregation and routing.
//!
//! Merges the catalogs of every connected provider into one flat,
//! name-deduplicated catalog and records which provider owns each name.
//! Collisions resolve first-registered-wins: the earlier provider in the
//! handle sequence keeps the name, the later entry is dropped and recorded.

use crate::error::{DispatchError, ProviderError};
use crate::provider::{Connector, ProviderHandle};
use crate::types::{ProviderId, ToolDescriptor, ToolInvocation, ToolResult};
use std::collections::HashMap;
use std::time::Duration;

/// A tool entry dropped because another provider registered the name first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionRecord {
    pub tool: String,
    pub kept: ProviderId,
    pub dropped: ProviderId,
}

/// Tool name → owning provider, plus the flattened catalog in registration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingTable {
    routes: HashMap<String, ProviderId>,
    catalog: Vec<ToolDescriptor>,
    collisions: Vec<CollisionRecord>,
}

impl RoutingTable {
    /// Merge the catalogs of `handles` in order
    pub fn from_handles(handles: &[ProviderHandle]) -> Self {
        let mut table = Self::default();

        for handle in handles {
            for tool in &handle.catalog {
                if let Some(owner) = table.routes.get(&tool.name) {
                    tracing::warn!(
                        tool = %tool.name,
                        kept = %owner,
                        dropped = %handle.provider_id,
                        "Tool name collision, keeping first registration"
                    );
                    table.collisions.push(CollisionRecord {
                        tool: tool.name.clone(),
                        kept: owner.clone(),
                        dropped: handle.provider_id.clone(),
                    });
                    continue;
                }

                table
                    .routes
                    .insert(tool.name.clone(), handle.provider_id.clone());
                table.catalog.push(tool.clone());
            }
        }

        table
    }

    pub fn owner(&self, tool_name: &str) -> Option<&ProviderId> {
        self.routes.get(tool_name)
    }

    pub fn catalog(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    pub fn collisions(&self) -> &[CollisionRecord] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Presents several providers as one catalog and routes calls to their owners
pub struct Aggregator {
    handles: Vec<ProviderHandle>,
    table: RoutingTable,
    call_timeout: Duration,
}

impl Aggregator {
    /// Query every handle's catalog in order and build the routing table.
    ///
    /// A provider whose catalog cannot be listed contributes no tools; it
    /// never prevents the others from being used.
    pub async fn build(mut handles: Vec<ProviderHandle>) -> Self {
        for handle in handles.iter_mut() {
            match handle.refresh_catalog().await {
                Ok(count) => {
                    tracing::info!(
                        provider = %handle.provider_id,
                        tools = count,
                        "Catalog loaded"
                    );
                }
                Err(e) => {
                    tracing::warn!(provider = %handle.provider_id, error = %e, "Failed to list tools");
                    handle.catalog.clear();
                }
            }
        }

        let table = RoutingTable::from_handles(&handles);
        tracing::info!(
            "Aggregated {} tools from {} providers",
            table.len(),
            handles.len()
        );

        Self {
            handles,
            table,
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Resolve the owning provider. Always checked before any dispatch.
    pub fn route(&self, tool_name: &str) -> Result<&ProviderId, DispatchError> {
        self.table
            .owner(tool_name)
            .ok_or_else(|| DispatchError::UnknownTool(tool_name.to_string()))
    }

    /// Route one invocation to its owner and wait (bounded) for the result
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> Result<ToolResult, DispatchError> {
        let provider_id = self.route(&invocation.name)?;
        let handle = self
            .handle(provider_id)
            .ok_or_else(|| DispatchError::UnknownTool(invocation.name.clone()))?;

        tracing::debug!(
            tool = %invocation.name,
            provider = %provider_id,
            request_id = %invocation.request_id,
            "Dispatching tool call"
        );

        let call = handle.connection.call_tool_within(
            &invocation.name,
            invocation.arguments.clone(),
            self.call_timeout,
        );

        match call.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProviderError::Timeout {
                provider: provider_id.clone(),
                elapsed_ms: self.call_timeout.as_millis(),
            }
            .into()),
        }
    }

    pub fn catalog(&self) -> &[ToolDescriptor] {
        self.table.catalog()
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn handles(&self) -> &[ProviderHandle] {
        &self.handles
    }

    pub fn handle(&self, provider_id: &ProviderId) -> Option<&ProviderHandle> {
        self.handles.iter().find(|h| &h.provider_id == provider_id)
    }

    /// Re-establish closed sessions; rebuild routes if any catalog changed.
    /// Returns the number of sessions revived.
    pub async fn revive(&mut self, connector: &dyn Connector) -> usize {
        let mut revived = 0;
        let mut catalog_changed = false;

        for handle in self.handles.iter_mut() {
            if !handle.connection.is_closed() {
                continue;
            }

            tracing::info!(provider = %handle.provider_id, "Reconnecting closed provider");
            let reconnected = match connector.connect(&handle.provider_id).await {
                Ok(mut fresh) => match fresh.refresh_catalog().await {
                    Ok(_) => Ok(fresh),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match reconnected {
                Ok(fresh) => {
                    if fresh.catalog != handle.catalog {
                        catalog_changed = true;
                    }
                    *handle = fresh;
                    revived += 1;
                }
                Err(e) => {
                    tracing::warn!(provider = %handle.provider_id, error = %e, "Reconnect failed");
                }
            }
        }

        if catalog_changed {
            tracing::info!("Provider catalog changed, rebuilding routing table");
            self.table = RoutingTable::from_handles(&self.handles);
        }

        revived
    }

    /// Close every session in registration order
    pub async fn shutdown(&self) {
        for handle in &self.handles {
            tracing::info!(provider = %handle.provider_id, "Closing provider session");
            handle.connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{handle, invocation, tool, MockProvider};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_route_to_declaring_provider() {
        let db = MockProvider::new(vec![tool("execute-sql"), tool("list-tables")]);
        let papers = MockProvider::new(vec![tool("search_papers")]);
        let aggregator =
            Aggregator::build(vec![handle("postgres", db.clone()), handle("arxiv", papers.clone())])
                .await;

        assert_eq!(aggregator.route("execute-sql").unwrap().as_str(), "postgres");
        assert_eq!(aggregator.route("list-tables").unwrap().as_str(), "postgres");
        assert_eq!(aggregator.route("search_papers").unwrap().as_str(), "arxiv");
        assert!(aggregator.table().collisions().is_empty());
        assert_eq!(aggregator.catalog().len(), 3);
    }

    #[tokio::test]
    async fn test_collision_first_registered_wins() {
        let first = MockProvider::new(vec![tool("search"), tool("a")]);
        let second = MockProvider::new(vec![tool("search"), tool("b")]);
        let aggregator =
            Aggregator::build(vec![handle("first", first.clone()), handle("second", second.clone())])
                .await;

        assert_eq!(aggregator.route("search").unwrap().as_str(), "first");
        assert_eq!(
            aggregator.table().collisions(),
            &[CollisionRecord {
                tool: "search".to_string(),
                kept: ProviderId::new("first"),
                dropped: ProviderId::new("second"),
            }]
        );
        // Catalog carries the name once
        let names: Vec<_> = aggregator.catalog().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["search", "a", "b"]);

        aggregator.dispatch(&invocation("search")).await.unwrap();
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_never_contacts_provider() {
        let db = MockProvider::new(vec![tool("execute-sql")]);
        let aggregator = Aggregator::build(vec![handle("postgres", db.clone())]).await;

        let err = aggregator.dispatch(&invocation("drop-everything")).await.unwrap_err();
        assert_eq!(err, DispatchError::UnknownTool("drop-everything".to_string()));
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let slow = MockProvider::new(vec![tool("list-tables")]).with_delay(Duration::from_secs(120));
        let aggregator = Aggregator::build(vec![handle("postgres", slow)])
            .await
            .with_call_timeout(Duration::from_secs(5));

        let err = aggregator.dispatch(&invocation("list-tables")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Provider(ProviderError::Timeout { ref provider, .. }) if provider.as_str() == "postgres"
        ));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate_unchanged() {
        let failing = MockProvider::new(vec![tool("list-tables")]).with_failure(
            ProviderError::Disconnected {
                provider: ProviderId::new("postgres"),
            },
        );
        let aggregator = Aggregator::build(vec![handle("postgres", failing)]).await;

        let err = aggregator.dispatch(&invocation("list-tables")).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Provider(ProviderError::Disconnected {
                provider: ProviderId::new("postgres")
            })
        );
    }

    #[tokio::test]
    async fn test_failed_listing_does_not_block_others() {
        let broken = MockProvider::new(vec![tool("x")]).with_listing_failure();
        let papers = MockProvider::new(vec![tool("search_papers")]);
        let aggregator =
            Aggregator::build(vec![handle("postgres", broken), handle("arxiv", papers)]).await;

        assert!(aggregator.route("x").is_err());
        assert!(aggregator.route("search_papers").is_ok());
    }

    #[tokio::test]
    async fn test_build_is_idempotent() {
        let db = MockProvider::new(vec![tool("execute-sql"), tool("list-tables")]);
        let papers = MockProvider::new(vec![tool("search_papers"), tool("list-tables")]);
        let handles = vec![handle("postgres", db), handle("arxiv", papers)];

        let first = Aggregator::build(handles.clone()).await;
        let second = Aggregator::build(handles).await;
        assert_eq!(first.table(), second.table());
    }

    struct FixedConnector {
        provider: Arc<MockProvider>,
    }

    #[async_trait::async_trait]
    impl Connector for FixedConnector {
        async fn connect(&self, provider_id: &ProviderId) -> Result<ProviderHandle, ProviderError> {
            Ok(handle(provider_id.as_str(), self.provider.clone()))
        }
    }

    #[tokio::test]
    async fn test_revive_rebuilds_changed_catalog() {
        let old = MockProvider::new(vec![tool("list-tables")]);
        let mut aggregator = Aggregator::build(vec![handle("postgres", old.clone())]).await;
        old.set_closed(true);

        let connector = FixedConnector {
            provider: MockProvider::new(vec![tool("list-tables"), tool("test-connection")]),
        };
        assert_eq!(aggregator.revive(&connector).await, 1);
        assert_eq!(aggregator.route("test-connection").unwrap().as_str(), "postgres");

        // Nothing closed, nothing to do
        assert_eq!(aggregator.revive(&connector).await, 0);
    }

    #[tokio::test]
    async fn test_revive_keeps_handle_when_relisting_fails() {
        let old = MockProvider::new(vec![tool("list-tables")]);
        let mut aggregator = Aggregator::build(vec![handle("postgres", old.clone())]).await;
        old.set_closed(true);

        let connector = FixedConnector {
            provider: MockProvider::new(vec![tool("test-connection")]).with_listing_failure(),
        };
        assert_eq!(aggregator.revive(&connector).await, 0);
        assert_eq!(aggregator.route("list-tables").unwrap().as_str(), "postgres");
        assert!(aggregator.route("test-connection").is_err());
    }

    #[tokio::test]
    async fn test_build_records_listed_tools() {
        let db = MockProvider::new(vec![tool("execute-sql"), tool("list-tables")]);
        let aggregator = Aggregator::build(vec![handle("postgres", db)]).await;
        assert_eq!(
            aggregator.handles()[0].tool_names(),
            vec!["execute-sql", "list-tables"]
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_sessions() {
        let db = MockProvider::new(vec![tool("a")]);
        let papers = MockProvider::new(vec![tool("b")]);
        let aggregator =
            Aggregator::build(vec![handle("postgres", db.clone()), handle("arxiv", papers.clone())])
                .await;

        aggregator.shutdown().await;
        assert!(db.is_closed_flag());
        assert!(papers.is_closed_flag());
    }
}
