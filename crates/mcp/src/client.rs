//! Client side of a provider session.
//!
//! A [`ProviderConnection`] owns one bidirectional session with a tool
//! provider process: it spawns the process, performs the `initialize`
//! handshake, and correlates each request with exactly one response by
//! JSON-RPC id. A background reader task demultiplexes responses; when the
//! stream ends every waiting caller observes `ProviderDisconnected`.

use crate::protocol::{
    methods, ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ServerInfo, PROTOCOL_VERSION,
};
use crate::transport::{
    line_reader, line_writer, read_message, write_message, LineReader, LineWriter, TransportError,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio_util::codec::LinesCodecError;
use toolmux_core::{
    Connector, ContentBlock, ProviderError, ProviderHandle, ProviderId, ProviderLaunchSpec,
    TimeoutConfig, ToolDescriptor, ToolProvider, ToolResult,
};
use tracing::{debug, info, warn};

/// Guard against providers that paginate forever
const MAX_LIST_PAGES: usize = 64;

type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type SharedWriter = Arc<Mutex<Option<LineWriter>>>;

pub struct ProviderConnection {
    provider_id: ProviderId,
    writer: SharedWriter,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    call_guard: Mutex<()>,
    child: Mutex<Option<Child>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    timeouts: TimeoutConfig,
    server_info: StdMutex<Option<ServerInfo>>,
}

impl ProviderConnection {
    /// Spawn the provider process and complete the handshake
    pub async fn spawn(
        spec: &ProviderLaunchSpec,
        timeouts: &TimeoutConfig,
    ) -> Result<Arc<Self>, ProviderError> {
        let provider_id = ProviderId::new(&spec.id);
        let unreachable = |reason: String| ProviderError::Unreachable {
            provider: provider_id.clone(),
            reason,
        };

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unreachable(format!("failed to start '{}': {}", spec.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| unreachable("no stdin for provider process".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unreachable("no stdout for provider process".to_string()))?;

        debug!(provider = %provider_id, command = %spec.command, "Spawned provider process");

        let connection = Self::from_transport(provider_id, stdout, stdin, timeouts.clone());
        *connection.child.lock().await = Some(child);

        if let Err(e) = connection.initialize().await {
            connection.close().await;
            return Err(e);
        }
        Ok(connection)
    }

    /// Attach to an already-established byte stream (no handshake yet)
    pub fn from_transport<R, W>(
        provider_id: ProviderId,
        reader: R,
        writer: W,
        timeouts: TimeoutConfig,
    ) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Some(line_writer(writer))));
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            provider_id.clone(),
            line_reader(reader),
            writer.clone(),
            pending.clone(),
            closed.clone(),
        ));

        Arc::new(Self {
            provider_id,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            call_guard: Mutex::new(()),
            child: Mutex::new(None),
            reader_task: StdMutex::new(Some(reader_task)),
            timeouts,
            server_info: StdMutex::new(None),
        })
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().ok().and_then(|info| info.clone())
    }

    /// Capability handshake: `initialize` then `notifications/initialized`
    pub async fn initialize(&self) -> Result<InitializeResult, ProviderError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "toolmux".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let params = serde_json::to_value(params).map_err(|e| self.protocol(e.to_string()))?;

        let response = self
            .request(methods::INITIALIZE, Some(params), self.timeouts.handshake())
            .await
            .map_err(|e| match e {
                ProviderError::Timeout { .. } | ProviderError::Disconnected { .. } => {
                    ProviderError::Unreachable {
                        provider: self.provider_id.clone(),
                        reason: format!("handshake failed: {}", e),
                    }
                }
                other => other,
            })?;

        let result: InitializeResult = serde_json::from_value(self.expect_result(response)?)
            .map_err(|e| self.protocol(format!("malformed initialize result: {}", e)))?;

        self.notify(methods::INITIALIZED, None).await?;

        info!(
            provider = %self.provider_id,
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Provider handshake complete"
        );
        if let Ok(mut info) = self.server_info.lock() {
            *info = Some(result.server_info.clone());
        }
        Ok(result)
    }

    /// Send one request and wait (bounded) for the response with its id
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, ProviderError> {
        if self.is_closed() {
            return Err(self.disconnected());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(id, tx);
        let _pending = PendingEntry {
            pending: &self.pending,
            id,
        };

        let request = JsonRpcRequest::new(id, method, params);
        debug!(provider = %self.provider_id, id, method, "Sending request");

        let exchange = async {
            self.send(&request).await?;
            rx.await.map_err(|_| self.disconnected())
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.provider_id.clone(),
                elapsed_ms: timeout.as_millis(),
            }),
        }
    }

    /// One `tools/call` exchange; the caller holds the call guard
    async fn call_exchange(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<ToolResult, ProviderError> {
        let params = json!({ "name": name, "arguments": Value::Object(arguments) });
        let response = self
            .request(methods::TOOLS_CALL, Some(params), timeout)
            .await?;

        if let Some(error) = response.error {
            return Ok(ToolResult::Error {
                message: error.message.clone(),
                content: vec![ContentBlock::text(format!("Error: {}", error.message))],
            });
        }

        let result = response
            .result
            .ok_or_else(|| self.protocol("tools/call response has no result".to_string()))?;
        let result: CallToolResponse = serde_json::from_value(result)
            .map_err(|e| self.protocol(format!("malformed tools/call result: {}", e)))?;

        let content: Vec<ContentBlock> = result.content.into_iter().map(content_block).collect();
        if result.is_error {
            let message = content
                .iter()
                .map(ContentBlock::render)
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ToolResult::Error { message, content });
        }
        Ok(ToolResult::Success(content))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ProviderError> {
        self.send(&JsonRpcRequest::notification(method, params)).await
    }

    async fn send(&self, request: &JsonRpcRequest) -> Result<(), ProviderError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| self.disconnected())?;
        write_message(writer, request).await.map_err(|e| {
            warn!(provider = %self.provider_id, error = %e, "Write to provider failed");
            self.disconnected()
        })
    }

    fn expect_result(&self, response: JsonRpcResponse) -> Result<Value, ProviderError> {
        if let Some(error) = response.error {
            return Err(self.protocol(error.to_string()));
        }
        response
            .result
            .ok_or_else(|| self.protocol("response has neither result nor error".to_string()))
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn protocol(&self, reason: String) -> ProviderError {
        ProviderError::Protocol {
            provider: self.provider_id.clone(),
            reason,
        }
    }

    fn disconnected(&self) -> ProviderError {
        ProviderError::Disconnected {
            provider: self.provider_id.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ToolProvider for ProviderConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let response = self
                .request(methods::TOOLS_LIST, params, self.timeouts.call())
                .await?;
            let result = self.expect_result(response)?;

            let entries = result
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| self.protocol("tools/list result has no 'tools' array".to_string()))?;
            for entry in entries {
                tools.push(parse_descriptor(entry).map_err(|reason| self.protocol(reason))?);
            }

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(tools);
            }
        }

        Err(self.protocol(format!("tools/list exceeded {} pages", MAX_LIST_PAGES)))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, ProviderError> {
        // One call at a time per provider session
        let _guard = self.call_guard.lock().await;
        self.call_exchange(name, arguments, self.timeouts.call()).await
    }

    async fn call_tool_within(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        limit: Duration,
    ) -> Result<Result<ToolResult, ProviderError>, Elapsed> {
        // The clock starts once earlier calls have finished
        let _guard = self.call_guard.lock().await;
        Ok(self.call_exchange(name, arguments, limit).await)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        // Dropping the writer closes the provider's stdin
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(self.timeouts.shutdown_grace(), child.wait()).await {
                Ok(Ok(status)) => debug!(provider = %self.provider_id, %status, "Provider exited"),
                _ => {
                    warn!(provider = %self.provider_id, "Provider did not exit in time, killing");
                    let _ = child.kill().await;
                }
            }
        }

        let task = self.reader_task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            task.abort();
        }
        self.pending_map().clear();
    }
}

/// Removes a request's response slot however the request ends
struct PendingEntry<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

#[derive(Debug, Deserialize)]
struct CallToolResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(rename = "isError", default)]
    is_error: bool,
}

fn content_block(value: Value) -> ContentBlock {
    match (value.get("type").and_then(Value::as_str), value.get("text").and_then(Value::as_str)) {
        (Some("text"), Some(text)) => ContentBlock::text(text),
        _ => ContentBlock::Data { data: value },
    }
}

fn parse_descriptor(entry: &Value) -> Result<ToolDescriptor, String> {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "tool entry without a name".to_string())?;
    let input_schema = entry
        .get("inputSchema")
        .filter(|s| s.is_object())
        .ok_or_else(|| format!("tool '{}' has no inputSchema object", name))?;
    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: input_schema.clone(),
    })
}

async fn read_loop(
    provider_id: ProviderId,
    mut reader: LineReader,
    writer: SharedWriter,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
) {
    while let Some(message) = read_message(&mut reader).await {
        let value = match message {
            Ok(value) => value,
            Err(TransportError::Framing(LinesCodecError::Io(e))) => {
                warn!(provider = %provider_id, error = %e, "Provider stream failed");
                break;
            }
            Err(e) => {
                warn!(provider = %provider_id, error = %e, "Unreadable message from provider");
                continue;
            }
        };

        match JsonRpcMessage::from_value(value) {
            Ok(JsonRpcMessage::Response(response)) => {
                let Some(id) = response.id.as_u64() else {
                    warn!(provider = %provider_id, id = %response.id, "Response with unexpected id");
                    continue;
                };
                let sender = pending
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&id);
                match sender {
                    Some(sender) => {
                        let _ = sender.send(response);
                    }
                    None => debug!(provider = %provider_id, id, "Dropping late or unmatched response"),
                }
            }
            Ok(JsonRpcMessage::Request(request)) => {
                handle_server_request(&provider_id, &writer, request).await;
            }
            Err(e) => warn!(provider = %provider_id, error = %e, "Malformed JSON-RPC message"),
        }
    }

    info!(provider = %provider_id, "Provider stream closed");
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiting caller with a disconnect
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
}

/// Requests initiated by the provider: answer `ping`, refuse the rest
async fn handle_server_request(provider_id: &ProviderId, writer: &SharedWriter, request: JsonRpcRequest) {
    let Some(id) = request.id.clone() else {
        debug!(provider = %provider_id, method = %request.method, "Provider notification");
        return;
    };

    let response = if request.method == methods::PING {
        JsonRpcResponse::success(id, json!({}))
    } else {
        JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method))
    };

    if let Some(writer) = writer.lock().await.as_mut() {
        if let Err(e) = write_message(writer, &response).await {
            warn!(provider = %provider_id, error = %e, "Failed to answer provider request");
        }
    }
}

/// Launches providers from their configured specs
pub struct StdioConnector {
    specs: Vec<ProviderLaunchSpec>,
    timeouts: TimeoutConfig,
}

impl StdioConnector {
    pub fn new(specs: Vec<ProviderLaunchSpec>, timeouts: TimeoutConfig) -> Self {
        Self { specs, timeouts }
    }

    /// Connect every configured provider in order. Failures are logged and
    /// skipped so one broken provider never blocks the others.
    pub async fn connect_all(&self) -> Vec<ProviderHandle> {
        let mut handles = Vec::new();
        for spec in &self.specs {
            match self.connect(&ProviderId::new(&spec.id)).await {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::error!(provider = %spec.id, error = %e, "Failed to connect provider"),
            }
        }
        handles
    }
}

#[async_trait::async_trait]
impl Connector for StdioConnector {
    async fn connect(&self, provider_id: &ProviderId) -> Result<ProviderHandle, ProviderError> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.id == provider_id.as_str())
            .ok_or_else(|| ProviderError::Unreachable {
                provider: provider_id.clone(),
                reason: "no launch spec configured".to_string(),
            })?;

        let connection = ProviderConnection::spawn(spec, &self.timeouts).await?;
        Ok(ProviderHandle::new(provider_id.clone(), connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// A hand-driven provider end of the stream
    struct FakeProvider {
        lines: tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        out: tokio::io::WriteHalf<DuplexStream>,
    }

    impl FakeProvider {
        async fn next_request(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn reply(&mut self, value: Value) {
            let mut line = serde_json::to_string(&value).unwrap();
            line.push('\n');
            self.out.write_all(line.as_bytes()).await.unwrap();
        }
    }

    fn pair(timeouts: TimeoutConfig) -> (Arc<ProviderConnection>, FakeProvider) {
        let (client_side, provider_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (provider_read, provider_write) = tokio::io::split(provider_side);
        let connection = ProviderConnection::from_transport(
            ProviderId::new("fake"),
            client_read,
            client_write,
            timeouts,
        );
        let fake = FakeProvider {
            lines: BufReader::new(provider_read).lines(),
            out: provider_write,
        };
        (connection, fake)
    }

    #[tokio::test]
    async fn test_list_tools_rejects_missing_schema() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        let server = tokio::spawn(async move {
            let request = fake.next_request().await;
            assert_eq!(request["method"], "tools/list");
            fake.reply(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": {"tools": [{"name": "execute-sql", "description": "Run SQL"}]}
            }))
            .await;
            fake
        });

        let err = connection.list_tools().await.unwrap_err();
        assert!(matches!(err, ProviderError::Protocol { ref reason, .. } if reason.contains("inputSchema")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        tokio::spawn(async move {
            let first = fake.next_request().await;
            fake.reply(json!({
                "jsonrpc": "2.0", "id": first["id"],
                "result": {"tools": [{"name": "a", "inputSchema": {"type": "object"}}], "nextCursor": "p2"}
            }))
            .await;
            let second = fake.next_request().await;
            assert_eq!(second["params"]["cursor"], "p2");
            fake.reply(json!({
                "jsonrpc": "2.0", "id": second["id"],
                "result": {"tools": [{"name": "b", "inputSchema": {"type": "object"}}]}
            }))
            .await;
            fake
        });

        let tools = connection.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_call_tool_maps_is_error() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        tokio::spawn(async move {
            let request = fake.next_request().await;
            assert_eq!(request["params"]["name"], "execute-sql");
            assert_eq!(request["params"]["arguments"]["query"], "SELEC 1");
            fake.reply(json!({
                "jsonrpc": "2.0", "id": request["id"],
                "result": {"content": [{"type": "text", "text": "syntax error"}], "isError": true}
            }))
            .await;
            fake
        });

        let mut args = Map::new();
        args.insert("query".to_string(), json!("SELEC 1"));
        let result = connection.call_tool("execute-sql", args).await.unwrap();
        assert_eq!(
            result,
            ToolResult::Error {
                message: "syntax error".to_string(),
                content: vec![ContentBlock::text("syntax error")],
            }
        );
    }

    #[tokio::test]
    async fn test_empty_success_is_distinct_from_error() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        tokio::spawn(async move {
            let request = fake.next_request().await;
            fake.reply(json!({"jsonrpc": "2.0", "id": request["id"], "result": {"content": []}}))
                .await;
            fake
        });

        let result = connection.call_tool("list-tables", Map::new()).await.unwrap();
        assert_eq!(result, ToolResult::Success(vec![]));
    }

    #[tokio::test]
    async fn test_non_text_content_kept_as_data() {
        let block = content_block(json!({"type": "image", "data": "aGk=", "mimeType": "image/png"}));
        assert!(matches!(block, ContentBlock::Data { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let timeouts = TimeoutConfig {
            call_secs: 2,
            ..TimeoutConfig::default()
        };
        let (connection, fake) = pair(timeouts);

        let err = connection.call_tool("list-tables", Map::new()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { elapsed_ms: 2000, .. }));
        // Session survives a timeout
        assert!(!connection.is_closed());
        drop(fake);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_releases_its_slot() {
        let (connection, fake) = pair(TimeoutConfig::default());

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            connection.call_tool("list-tables", Map::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(connection.pending_map().is_empty());
        drop(fake);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_handshake_is_unreachable() {
        let timeouts = TimeoutConfig {
            handshake_secs: 3,
            ..TimeoutConfig::default()
        };
        let (connection, mut fake) = pair(timeouts);
        let listener = tokio::spawn(async move {
            let request = fake.next_request().await;
            assert_eq!(request["method"], "initialize");
            assert_eq!(request["params"]["protocolVersion"], PROTOCOL_VERSION);
            // Never answers, but keeps the stream open
            fake
        });

        let err = connection.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Unreachable { ref provider, ref reason }
                if provider.as_str() == "fake" && reason.contains("handshake")
        ));
        assert!(connection.server_info().is_none());
        assert!(connection.pending_map().is_empty());
        drop(listener.await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_handshake_is_protocol_error() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        tokio::spawn(async move {
            let request = fake.next_request().await;
            fake.reply(json!({
                "jsonrpc": "2.0", "id": request["id"],
                "result": {"protocolVersion": 42, "serverInfo": "postgres"}
            }))
            .await;
            fake
        });

        let err = connection.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Protocol { ref reason, .. } if reason.contains("malformed initialize result")
        ));
        assert!(connection.server_info().is_none());
    }

    #[tokio::test]
    async fn test_handshake_completes() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        let provider = tokio::spawn(async move {
            let request = fake.next_request().await;
            fake.reply(json!({
                "jsonrpc": "2.0", "id": request["id"],
                "result": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "toolmux-postgres", "version": "0.1.0"}
                }
            }))
            .await;
            let initialized = fake.next_request().await;
            assert_eq!(initialized["method"], "notifications/initialized");
            assert!(initialized.get("id").is_none());
            fake
        });

        let result = connection.initialize().await.unwrap();
        assert_eq!(result.server_info.name, "toolmux-postgres");
        assert_eq!(connection.server_info().unwrap().version, "0.1.0");
        provider.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_mid_call() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        tokio::spawn(async move {
            let _request = fake.next_request().await;
            drop(fake);
        });

        let err = connection.call_tool("list-tables", Map::new()).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Disconnected {
                provider: ProviderId::new("fake")
            }
        );

        // Reader observed EOF; later calls fail fast
        tokio::task::yield_now().await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_answers_provider_ping() {
        let (connection, mut fake) = pair(TimeoutConfig::default());
        fake.reply(json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"})).await;
        let reply = fake.next_request().await;
        assert_eq!(reply["id"], "srv-1");
        assert_eq!(reply["result"], json!({}));
        drop(connection);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_unreachable() {
        let spec = ProviderLaunchSpec::new("ghost", "/nonexistent/toolmux-ghost-provider");
        let err = ProviderConnection::spawn(&spec, &TimeoutConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Unreachable { ref provider, .. } if provider.as_str() == "ghost"));
    }

    #[tokio::test]
    async fn test_connector_unknown_provider() {
        let connector = StdioConnector::new(vec![], TimeoutConfig::default());
        let err = connector.connect(&ProviderId::new("postgres")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unreachable { .. }));
        assert!(connector.connect_all().await.is_empty());
    }
}
