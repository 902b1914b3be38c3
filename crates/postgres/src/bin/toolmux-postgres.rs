// Standalone PostgreSQL tool provider

use anyhow::{Context, Result};
use toolmux_mcp::McpServer;
use toolmux_postgres::{tools, Database, DatabaseConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolmux=info,toolmux_postgres=info,toolmux_mcp=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = DatabaseConfig::from_env().context("Invalid database configuration")?;
    tracing::info!(?config, "toolmux-postgres starting");

    let database = Database::connect(&config).context("Failed to set up database pool")?;
    let registry = tools::registry(database.clone());
    tracing::info!("Registered {} tools", registry.len());

    let server = McpServer::new("toolmux-postgres", env!("CARGO_PKG_VERSION"), registry);
    let served = server.serve_stdio().await;

    database.close();
    tracing::info!("toolmux-postgres stopped");

    served.context("MCP session failed")?;
    Ok(())
}
