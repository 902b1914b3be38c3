use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifier of a configured tool provider (e.g. "postgres", "arxiv")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a model-requested tool call with its folded-back result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tool as advertised by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Parameter names paired with their declared JSON types
    pub fn parameters(&self) -> Vec<(String, String)> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| {
                        let ty = schema
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown");
                        (name.clone(), ty.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One block of tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    /// Any non-text block, kept verbatim
    Data { data: Value },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Human-readable rendering used when folding results into the dialogue
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Data { data } => data.to_string(),
        }
    }
}

/// Outcome of a tool call that reached its provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolResult {
    Success(Vec<ContentBlock>),
    /// Provider-reported failure (e.g. invalid SQL). Not a system fault.
    Error {
        message: String,
        content: Vec<ContentBlock>,
    },
}

impl ToolResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            content: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::Success(content) => content,
            Self::Error { content, .. } => content,
        }
    }

    /// Concatenated text of all content blocks
    pub fn text(&self) -> String {
        match self {
            Self::Success(content) => join_blocks(content),
            Self::Error { message, content } if content.is_empty() => message.clone(),
            Self::Error { content, .. } => join_blocks(content),
        }
    }
}

fn join_blocks(content: &[ContentBlock]) -> String {
    content
        .iter()
        .map(ContentBlock::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A single model-requested tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub request_id: RequestId,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            request_id: RequestId::new(),
            name: name.into(),
            arguments,
        }
    }
}

/// Render a catalog as a plain-text listing with parameter types
pub fn render_catalog<'a>(tools: impl IntoIterator<Item = &'a ToolDescriptor>) -> String {
    let mut out = String::from("Available tools:\n");
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        let params = tool.parameters();
        if !params.is_empty() {
            let rendered = params
                .iter()
                .map(|(name, ty)| format!("{} ({})", name, ty))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("  Parameters: {}\n", rendered));
        }
    }
    out
}
