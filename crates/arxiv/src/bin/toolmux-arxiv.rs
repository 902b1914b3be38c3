// Standalone arXiv research tool provider

use anyhow::{Context, Result};
use toolmux_arxiv::{tools, ArxivClient, ArxivConfig, PaperStore};
use toolmux_mcp::McpServer;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolmux=info,toolmux_arxiv=info,toolmux_mcp=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = ArxivConfig::from_env().context("Invalid arXiv configuration")?;
    tracing::info!(
        api = %config.api_url,
        papers = %config.paper_dir.display(),
        "toolmux-arxiv starting"
    );

    let client = ArxivClient::new(&config).context("Failed to create HTTP client")?;
    let registry = tools::registry(client, PaperStore::new(&config.paper_dir));
    tracing::info!("Registered {} tools", registry.len());

    let server = McpServer::new("toolmux-arxiv", env!("CARGO_PKG_VERSION"), registry);
    server.serve_stdio().await.context("MCP session failed")?;

    tracing::info!("toolmux-arxiv stopped");
    Ok(())
}
