// MCP server: answers JSON-RPC requests from a tool registry

use crate::protocol::{
    methods, CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo,
    ToolsCapability, PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;
use crate::transport::{line_reader, line_writer, read_message, write_message, TransportError};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::LinesCodecError;
use tracing::{debug, info, warn};

pub struct McpServer {
    info: ServerInfo,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            registry,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<(), TransportError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests one line at a time until the reader reaches EOF
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), TransportError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut reader = line_reader(reader);
        let mut writer = line_writer(writer);

        info!(server = %self.info.name, tools = self.registry.len(), "MCP server ready");

        while let Some(message) = read_message(&mut reader).await {
            let response = match message {
                Ok(value) => self.handle_value(value).await,
                Err(TransportError::Json(e)) => {
                    warn!(error = %e, "Unparseable request line");
                    Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))
                }
                Err(TransportError::Framing(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!("Request line exceeds the maximum message size");
                    Some(JsonRpcResponse::error(Value::Null, JsonRpcError::invalid_request()))
                }
                Err(e) => return Err(e),
            };

            if let Some(response) = response {
                write_message(&mut writer, &response).await?;
            }
        }

        info!(server = %self.info.name, "Client closed the stream, shutting down");
        Ok(())
    }

    async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        match JsonRpcMessage::from_value(value) {
            Ok(JsonRpcMessage::Request(request)) => self.handle_request(request).await,
            Ok(JsonRpcMessage::Response(response)) => {
                debug!(id = %response.id, "Ignoring response from client");
                None
            }
            Err(e) => {
                warn!(error = %e, "Invalid JSON-RPC message");
                Some(JsonRpcResponse::error(Value::Null, JsonRpcError::invalid_request()))
            }
        }
    }

    /// Dispatch one request; notifications never produce a response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, "Handling request");

        let Some(id) = request.id.clone() else {
            if request.method != methods::INITIALIZED {
                debug!(method = %request.method, "Ignoring notification");
            }
            return None;
        };

        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.initialize(),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.list_tools(),
            methods::TOOLS_CALL => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(&self) -> Result<Value, JsonRpcError> {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
                experimental: None,
            },
            server_info: self.info.clone(),
        };
        to_value(&result)
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        to_value(&ListToolsResult {
            tools: self.registry.list_schemas(),
            next_cursor: None,
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
            })?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let result = match tool.execute(arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool execution failed");
                CallToolResult::error(format!("{:#}", e))
            }
        };

        to_value(&result)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
