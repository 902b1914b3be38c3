use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use toolmux_core::{Aggregator, GeminiClient, ModelConfig, Orchestrator};
use toolmux_mcp::StdioConnector;

mod config;
mod repl;

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "toolmux")]
#[command(about = "Chat with a language model that can query PostgreSQL and arXiv", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TOOLMUX_CONFIG", default_value = "toolmux.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is the conversation; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolmux=info,toolmux_cli=info,toolmux_core=info,toolmux_mcp=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    let mut model_config = ModelConfig::from_env().context("Model configuration")?;
    model_config.timeout = config.timeouts.model();
    tracing::info!(model = %model_config.model, "Using language model");
    let model = GeminiClient::new(model_config).context("Failed to create model client")?;

    let connector = Arc::new(StdioConnector::new(
        config.providers.clone(),
        config.timeouts.clone(),
    ));
    let handles = connector.connect_all().await;
    if handles.is_empty() {
        bail!(
            "none of the {} configured tool providers could be started",
            config.providers.len()
        );
    }
    tracing::info!(
        connected = handles.len(),
        configured = config.providers.len(),
        "Tool providers connected"
    );

    let aggregator = Aggregator::build(handles)
        .await
        .with_call_timeout(config.timeouts.call());
    for handle in aggregator.handles() {
        tracing::info!(
            provider = %handle.provider_id,
            tools = ?handle.tool_names(),
            "Connected to provider"
        );
    }

    let mut orchestrator = Orchestrator::new(Arc::new(model), aggregator)
        .with_config(config.orchestrator.clone())
        .with_model_timeout(config.timeouts.model())
        .with_connector(connector);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let outcome = repl::run(&mut orchestrator, stdin, tokio::io::stdout(), || async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    tracing::info!("Shutting down providers");
    orchestrator.shutdown().await;

    outcome
}
