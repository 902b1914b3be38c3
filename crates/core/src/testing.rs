// In-process providers and models for unit tests

use crate::conversation::Turn;
use crate::error::{ModelError, ProviderError};
use crate::llm::{LanguageModel, ModelReply};
use crate::provider::{ProviderHandle, ToolProvider};
use crate::types::{ContentBlock, ProviderId, ToolDescriptor, ToolInvocation, ToolResult};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn tool(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("{} tool", name),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

pub fn handle(id: &str, provider: Arc<MockProvider>) -> ProviderHandle {
    ProviderHandle::new(ProviderId::new(id), provider)
}

pub fn invocation(name: &str) -> ToolInvocation {
    ToolInvocation::new(name, Map::new())
}

pub struct MockProvider {
    tools: Vec<ToolDescriptor>,
    calls: AtomicUsize,
    closed: AtomicBool,
    listing_fails: AtomicBool,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<ProviderError>>,
    responses: Mutex<HashMap<String, ToolResult>>,
}

impl MockProvider {
    pub fn new(tools: Vec<ToolDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            tools,
            calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            listing_fails: AtomicBool::new(false),
            delay: Mutex::new(None),
            failure: Mutex::new(None),
            responses: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_failure(self: Arc<Self>, error: ProviderError) -> Arc<Self> {
        *self.failure.lock().unwrap() = Some(error);
        self
    }

    pub fn with_listing_failure(self: Arc<Self>) -> Arc<Self> {
        self.listing_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_response(self: Arc<Self>, tool: &str, result: ToolResult) -> Arc<Self> {
        self.responses
            .lock()
            .unwrap()
            .insert(tool.to_string(), result);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    pub fn is_closed_flag(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ToolProvider for MockProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Protocol {
                provider: ProviderId::new("mock"),
                reason: "missing inputSchema".to_string(),
            });
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Map<String, Value>,
    ) -> Result<ToolResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let canned = self.responses.lock().unwrap().get(name).cloned();
        Ok(canned.unwrap_or_else(|| {
            ToolResult::Success(vec![ContentBlock::text(format!("ok from {}", name))])
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Replays scripted replies and records what it was shown
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    seen: Mutex<Vec<(usize, Vec<String>)>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// (history length, catalog tool names) per request
    pub fn requests(&self) -> Vec<(usize, Vec<String>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(
        &self,
        history: &[Turn],
        catalog: &[ToolDescriptor],
    ) -> Result<ModelReply, ModelError> {
        self.seen.lock().unwrap().push((
            history.len(),
            catalog.iter().map(|t| t.name.clone()).collect(),
        ));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ModelReply::Text("done".to_string())))
    }
}
