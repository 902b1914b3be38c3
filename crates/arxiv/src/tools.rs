// Paper research tools served over MCP

use crate::client::ArxivClient;
use crate::store::{Lookup, PaperStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use toolmux_mcp::protocol::{CallToolResult, ToolSchema};
use toolmux_mcp::tools::{json_schema_integer, json_schema_object, json_schema_string, Tool, ToolRegistry};
use tracing::{info, warn};

const DEFAULT_RESULTS: usize = 5;
const MAX_RESULTS: usize = 100;

pub fn registry(client: ArxivClient, store: PaperStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchPapersTool::new(client, store.clone())));
    registry.register(Arc::new(ExtractInfoTool::new(store)));
    registry.register(Arc::new(SummaryPromptTool));
    registry
}

fn default_results() -> usize {
    DEFAULT_RESULTS
}

/// Tool to search arXiv and remember what was found
pub struct SearchPapersTool {
    client: ArxivClient,
    store: PaperStore,
}

impl SearchPapersTool {
    pub fn new(client: ArxivClient, store: PaperStore) -> Self {
        Self { client, store }
    }
}

#[derive(Debug, Deserialize)]
struct SearchPapersArgs {
    topic: String,
    #[serde(default = "default_results")]
    max_results: usize,
}

#[derive(Debug, Serialize)]
struct SearchSummary {
    paper_ids: Vec<String>,
    count: usize,
    saved_to: String,
}

#[async_trait::async_trait]
impl Tool for SearchPapersTool {
    fn schema(&self) -> ToolSchema {
        let mut max_results = json_schema_integer("Maximum number of results to retrieve");
        max_results["default"] = json!(DEFAULT_RESULTS);

        ToolSchema {
            name: "search_papers".to_string(),
            description: "Search for papers on arXiv based on a topic and store their information"
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "topic": json_schema_string("The topic to search for"),
                    "max_results": max_results
                }),
                vec!["topic"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: SearchPapersArgs =
            serde_json::from_value(arguments).context("Invalid arguments for search_papers")?;

        let topic = args.topic.trim();
        if topic.is_empty() {
            return Ok(CallToolResult::error("Topic must not be empty"));
        }
        let max_results = args.max_results.clamp(1, MAX_RESULTS);

        let papers = match self.client.search(topic, max_results).await {
            Ok(papers) => papers,
            Err(e) => {
                warn!(topic, error = %e, "arXiv search failed");
                return Ok(CallToolResult::error(format!("arXiv search failed: {}", e)));
            }
        };

        let saved_to = self
            .store
            .save(topic, &papers)
            .await
            .with_context(|| format!("Failed to save papers for '{}'", topic))?;
        info!(topic, count = papers.len(), path = %saved_to.display(), "Stored search results");

        let summary = SearchSummary {
            paper_ids: papers.iter().map(|p| p.short_id.clone()).collect(),
            count: papers.len(),
            saved_to: saved_to.display().to_string(),
        };
        Ok(CallToolResult::text(serde_json::to_string_pretty(&summary)?))
    }
}

/// Tool to look up a previously saved paper
pub struct ExtractInfoTool {
    store: PaperStore,
}

impl ExtractInfoTool {
    pub fn new(store: PaperStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractInfoArgs {
    paper_id: String,
}

#[async_trait::async_trait]
impl Tool for ExtractInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "extract_info".to_string(),
            description: "Search for information about a specific paper across all topic directories"
                .to_string(),
            input_schema: json_schema_object(
                json!({ "paper_id": json_schema_string("The ID of the paper to look for") }),
                vec!["paper_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ExtractInfoArgs =
            serde_json::from_value(arguments).context("Invalid arguments for extract_info")?;

        let text = match self.store.find(args.paper_id.trim()).await? {
            Lookup::Found(info) => serde_json::to_string_pretty(&info)?,
            Lookup::NotFound => format!("No saved information found for paper ID: {}.", args.paper_id),
            Lookup::NoStore => "No papers directory found. Please search for papers first.".to_string(),
        };
        Ok(CallToolResult::text(text))
    }
}

/// Tool producing a research-summary prompt for the model to follow
pub struct SummaryPromptTool;

#[derive(Debug, Deserialize)]
struct SummaryPromptArgs {
    topic: String,
    #[serde(default = "default_results")]
    num_papers: usize,
}

#[async_trait::async_trait]
impl Tool for SummaryPromptTool {
    fn schema(&self) -> ToolSchema {
        let mut num_papers = json_schema_integer("Number of papers to search for");
        num_papers["default"] = json!(DEFAULT_RESULTS);

        ToolSchema {
            name: "generate_summary_prompt".to_string(),
            description: "Generate a detailed prompt to summarize arXiv papers on a given topic"
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "topic": json_schema_string("Research topic"),
                    "num_papers": num_papers
                }),
                vec!["topic"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: SummaryPromptArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for generate_summary_prompt")?;
        Ok(CallToolResult::text(summary_prompt(&args.topic, args.num_papers)))
    }
}

pub fn summary_prompt(topic: &str, num_papers: usize) -> String {
    format!(
        r#"Search for {n} academic papers about '{topic}' using the `search_papers` tool. Follow these instructions:

1. Use the `search_papers(topic="{topic}", max_results={n})` tool to search for papers.
2. For each paper found, extract and organize the following information:
   - Paper title
   - Authors
   - Publication date
   - Brief summary of the key findings
   - Main contributions or innovations
   - Methodologies used
   - Relevance to the topic '{topic}'

3. Provide a comprehensive summary including:
   - Overview of current research in '{topic}'
   - Common themes and trends across the papers
   - Key research gaps or areas for future investigation
   - Most impactful or influential papers in this area

4. Format your response clearly with headings and bullet points for readability."#,
        n = num_papers,
        topic = topic
    )
}
