// Database tools served over MCP

use crate::db::{render_columns, render_outcomes, Database};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use toolmux_mcp::protocol::{CallToolResult, ToolSchema};
use toolmux_mcp::tools::{json_schema_empty, json_schema_object, json_schema_string, Tool, ToolRegistry};
use tracing::warn;

/// Registry with the four database tools, in their advertised order
pub fn registry(database: Database) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ExecuteSqlTool::new(database.clone())));
    registry.register(Arc::new(ListTablesTool::new(database.clone())));
    registry.register(Arc::new(DescribeTableTool::new(database.clone())));
    registry.register(Arc::new(TestConnectionTool::new(database)));
    registry
}

/// Tool to run arbitrary SQL
pub struct ExecuteSqlTool {
    database: Database,
}

impl ExecuteSqlTool {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlArgs {
    query: String,
}

#[async_trait::async_trait]
impl Tool for ExecuteSqlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "execute-sql".to_string(),
            description: "Execute a SQL query against the PostgreSQL database and return the results"
                .to_string(),
            input_schema: json_schema_object(
                json!({ "query": json_schema_string("The SQL query to execute") }),
                vec!["query"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ExecuteSqlArgs =
            serde_json::from_value(arguments).context("Invalid arguments for execute-sql")?;

        if args.query.trim().is_empty() {
            return Ok(CallToolResult::error("Query must not be empty"));
        }

        match self.database.execute(&args.query).await {
            Ok(outcomes) => Ok(CallToolResult::text(render_outcomes(&outcomes))),
            Err(e) => {
                warn!(error = %e, "Query failed");
                Ok(CallToolResult::error(format!("Query failed: {}", e)))
            }
        }
    }
}

/// Tool to list user tables
pub struct ListTablesTool {
    database: Database,
}

impl ListTablesTool {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait::async_trait]
impl Tool for ListTablesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list-tables".to_string(),
            description: "List all tables in the database".to_string(),
            input_schema: json_schema_empty(),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        match self.database.list_tables().await {
            Ok(tables) if tables.is_empty() => Ok(CallToolResult::text("No tables found")),
            Ok(tables) => Ok(CallToolResult::text(format!(
                "Tables ({}):\n{}",
                tables.len(),
                tables.join("\n")
            ))),
            Err(e) => Ok(CallToolResult::error(format!("Failed to list tables: {}", e))),
        }
    }
}

/// Tool to show the columns of one table
pub struct DescribeTableTool {
    database: Database,
}

impl DescribeTableTool {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeTableArgs {
    table_name: String,
}

#[async_trait::async_trait]
impl Tool for DescribeTableTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "describe-table".to_string(),
            description: "Show the columns, types, nullability and defaults of a table".to_string(),
            input_schema: json_schema_object(
                json!({
                    "tableName": json_schema_string("Name of the table, optionally schema-qualified")
                }),
                vec!["tableName"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: DescribeTableArgs =
            serde_json::from_value(arguments).context("Invalid arguments for describe-table")?;

        match self.database.describe_table(&args.table_name).await {
            Ok(columns) if columns.is_empty() => Ok(CallToolResult::error(format!(
                "Table '{}' not found",
                args.table_name
            ))),
            Ok(columns) => Ok(CallToolResult::text(render_columns(&args.table_name, &columns))),
            Err(e) => Ok(CallToolResult::error(format!(
                "Failed to describe table '{}': {}",
                args.table_name, e
            ))),
        }
    }
}

/// Tool to check that the database is reachable
pub struct TestConnectionTool {
    database: Database,
}

impl TestConnectionTool {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait::async_trait]
impl Tool for TestConnectionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "test-connection".to_string(),
            description: "Test the connection to the PostgreSQL database".to_string(),
            input_schema: json_schema_empty(),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        match self.database.server_version().await {
            Ok(version) => Ok(CallToolResult::text(format!(
                "Connection successful\n{}",
                version
            ))),
            Err(e) => Ok(CallToolResult::error(format!("Connection failed: {}", e))),
        }
    }
}
