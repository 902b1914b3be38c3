// Gemini generateContent client with function calling

use super::{LanguageModel, ModelReply};
use crate::conversation::{Turn, TurnKind};
use crate::error::ModelError;
use crate::types::{RequestId, ToolDescriptor, ToolInvocation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Reply directly when no tool is needed. Call tools when they help answer the user. \
Ask the user for any missing input a tool requires. \
If a tool returns an error, explain it or try again with corrected arguments.";

/// Schema keywords Gemini's function declarations accept
const SCHEMA_KEYS: &[&str] = &["type", "description", "enum", "format", "nullable", "required"];

/// Configuration for the Gemini client
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl ModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }

    /// Read `GEMINI_API_KEY`, `GEMINI_MODEL` and `GEMINI_BASE_URL`
    pub fn from_env() -> Result<Self, ModelError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelError::Config("GEMINI_API_KEY is not set".to_string()))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var("GEMINI_BASE_URL") {
            url::Url::parse(&base_url)
                .map_err(|e| ModelError::Config(format!("invalid GEMINI_BASE_URL: {}", e)))?;
            config.base_url = base_url;
        }
        Ok(config)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    config: ModelConfig,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let http = Client::builder()
            .user_agent("toolmux/0.1.0")
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    async fn send_once(&self, body: &GenerateContentRequest) -> Result<GenerateContentResponse, ModelError> {
        let response = self
            .http
            .post(self.config.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { ModelError::Timeout } else { ModelError::Http(e) })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(
        &self,
        history: &[Turn],
        catalog: &[ToolDescriptor],
    ) -> Result<ModelReply, ModelError> {
        let body = build_request(history, catalog);
        debug!(
            model = %self.config.model,
            turns = history.len(),
            tools = catalog.len(),
            "Sending generateContent request"
        );

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(response) => return parse_response(response),
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let backoff = self.config.backoff_for_attempt(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis(),
                        "Model request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn api_error(status: u16, body: &str) -> ModelError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    ModelError::Api { status, message }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
    system_instruction: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSpec {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn build_request(history: &[Turn], catalog: &[ToolDescriptor]) -> GenerateContentRequest {
    let mut contents: Vec<Content> = Vec::new();

    for turn in history {
        match &turn.kind {
            TurnKind::User { text } => contents.push(Content::new("user", vec![Part::text(text)])),
            TurnKind::Model { text } => contents.push(Content::new("model", vec![Part::text(text)])),
            TurnKind::ToolRequest { invocations } => {
                let parts = invocations
                    .iter()
                    .map(|inv| Part {
                        function_call: Some(FunctionCall {
                            id: Some(inv.request_id.to_string()),
                            name: inv.name.clone(),
                            args: inv.arguments.clone(),
                        }),
                        ..Default::default()
                    })
                    .collect();
                contents.push(Content::new("model", parts));
            }
            TurnKind::ToolResult {
                request_id,
                tool,
                result,
            } => {
                let response = if result.is_error() {
                    json!({ "error": result.text() })
                } else {
                    json!({ "content": result.text() })
                };
                let part = Part {
                    function_response: Some(FunctionResponse {
                        id: Some(request_id.to_string()),
                        name: tool.clone(),
                        response,
                    }),
                    ..Default::default()
                };

                // Results of one batch travel together in a single user turn
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part)
                    }
                    _ => contents.push(Content::new("user", vec![part])),
                }
            }
        }
    }

    let tools = if catalog.is_empty() {
        Vec::new()
    } else {
        vec![ToolSpec {
            function_declarations: catalog.iter().map(declaration).collect(),
        }]
    };

    GenerateContentRequest {
        contents,
        tools,
        system_instruction: Content {
            role: None,
            parts: vec![Part::text(SYSTEM_PROMPT)],
        },
    }
}

fn declaration(tool: &ToolDescriptor) -> FunctionDeclaration {
    let has_properties = tool
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| !p.is_empty())
        .unwrap_or(false);

    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: has_properties.then(|| sanitize_schema(&tool.input_schema)),
    }
}

/// Reduce a JSON schema to the OpenAPI subset Gemini accepts
fn sanitize_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    let mut out = Map::new();
    for (key, value) in obj {
        match key.as_str() {
            "properties" => {
                if let Some(props) = value.as_object() {
                    let props = props
                        .iter()
                        .map(|(name, prop)| (name.clone(), sanitize_schema(prop)))
                        .collect();
                    out.insert(key.clone(), Value::Object(props));
                }
            }
            "items" => {
                out.insert(key.clone(), sanitize_schema(value));
            }
            k if SCHEMA_KEYS.contains(&k) => {
                out.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }
    Value::Object(out)
}

fn parse_response(response: GenerateContentResponse) -> Result<ModelReply, ModelError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned")
            .to_string();
        return Err(ModelError::InvalidResponse(reason));
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let calls: Vec<ToolInvocation> = parts
        .iter()
        .filter_map(|p| p.function_call.as_ref())
        .map(|call| ToolInvocation {
            request_id: call.id.clone().map(RequestId).unwrap_or_default(),
            name: call.name.clone(),
            arguments: call.args.clone(),
        })
        .collect();
    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }

    let text = parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(ModelError::InvalidResponse(format!(
            "empty response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(ModelReply::Text(text.trim().to_string()))
}
