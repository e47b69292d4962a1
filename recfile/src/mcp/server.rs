//! MCP server implementation
//!
//! Line-delimited JSON-RPC over stdio (or any async reader/writer pair).

use super::protocol::{InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::tools::{get_tool_definitions, handle_tool_call};
use crate::config::EngineConfig;
use crate::store::RecordStore;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// MCP server for Recfile
///
/// Exposes query/insert/update/delete/info over recfile databases as MCP
/// tools. Holds no per-store state; every tool call hits the filesystem.
pub struct McpServer {
    store: RecordStore,
}

impl McpServer {
    /// Create a server backed by GNU recutils
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: RecordStore::new(config),
        }
    }

    /// Create a server around an existing engine
    pub fn with_store(store: RecordStore) -> Self {
        Self { store }
    }

    /// Run the MCP server on stdio until EOF
    pub async fn run(&self) -> crate::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve requests from `reader`, writing responses to `writer`
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> crate::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            "Recfile MCP server started (protocol version {})",
            super::protocol::MCP_PROTOCOL_VERSION
        );

        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("EOF received, shutting down");
                    break;
                }
                Err(e) => {
                    tracing::error!("Read error: {}", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::debug!("Received: {}", line);

            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) if request.is_notification() => {
                    tracing::debug!("Notification: {}", request.method);
                    continue;
                }
                Ok(request) => self.handle_request(request).await,
                Err(e) => JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Parse error: {}", e)),
                ),
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            tracing::debug!("Sent: {}", response_json);
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            );
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&request.params).await,
            "ping" => Ok(json!({})),
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        }
    }

    fn handle_initialize(&self) -> Result<Value, JsonRpcError> {
        serde_json::to_value(InitializeResult::default())
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        Ok(json!({ "tools": get_tool_definitions() }))
    }

    async fn handle_tools_call(&self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params
            .as_ref()
            .ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;

        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tool name"))?;

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let result = handle_tool_call(&self.store, tool_name, &arguments).await?;

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }
}
