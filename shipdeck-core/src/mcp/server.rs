//! MCP Server implementation

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::ConflictPolicy;
use crate::mcp::protocol::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, McpToolCall, McpToolDefinition,
    McpToolResult, PROTOCOL_VERSION, ServerCapabilities, ServerInfo, error_codes,
};
use crate::tools::schema::ToolSchema;
use crate::{Error, Result};

/// Trait for MCP tools
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Declared schema; name, description and input schema derive from it
    fn schema(&self) -> &ToolSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    fn description(&self) -> &str {
        &self.schema().description
    }

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value {
        self.schema().to_input_schema()
    }

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: Value) -> Result<McpToolResult>;
}

/// MCP Server that manages tools and handles requests
pub struct McpServer {
    tools: RwLock<BTreeMap<String, Arc<dyn McpTool>>>,
    server_name: String,
    server_version: String,
    conflict_policy: ConflictPolicy,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            server_name: name.into(),
            server_version: version.into(),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.server_name
    }

    /// Register a tool; a taken name is resolved by the conflict policy
    pub async fn register_tool(&self, tool: Arc<dyn McpTool>) -> Result<()> {
        let mut tools = self.tools.write().await;
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            match self.conflict_policy {
                ConflictPolicy::Reject => return Err(Error::DuplicateTool(name)),
                ConflictPolicy::Replace => {
                    warn!("Tool '{}' registered twice, keeping the latest", name);
                }
            }
        }
        tools.insert(name, tool);
        Ok(())
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Registered tool names in sorted order
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Handle one inbound message; notifications yield no response
    pub async fn handle_message(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!("MCP notification: {}", request.method);
            return None;
        }
        Some(self.handle_request(request).await)
    }

    /// Handle an incoming JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
            "notifications/initialized" | "initialized" => {
                JsonRpcResponse::success(request.id, serde_json::json!({}))
            }
            "tools/list" => self.handle_list_tools(request.id).await,
            "tools/call" => self.handle_call_tool(request.id, request.params).await,
            _ => JsonRpcResponse::error(
                request.id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: self.server_version.clone(),
            },
        };
        match serde_json::to_value(result) {
            Ok(v) => JsonRpcResponse::success(id, v),
            Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self.tools.read().await;
        let tool_defs: Vec<McpToolDefinition> = tools
            .values()
            .map(|t| McpToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();

        JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_defs }))
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "Missing params for tools/call",
            );
        };

        let call: McpToolCall = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid tool call params: {}", e),
                );
            }
        };

        let tools = self.tools.read().await;
        let Some(tool) = tools.get(&call.name).map(Arc::clone) else {
            return JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", call.name),
            );
        };

        // Release lock before executing tool
        drop(tools);

        if let Err(e) = tool.schema().validate(&call.arguments) {
            debug!("Rejected {} arguments: {}", call.name, e);
            return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, e.to_string());
        }

        let result = match tool.execute(call.arguments).await {
            Ok(result) => result,
            Err(e) => McpToolResult::error(e.to_string()),
        };
        match serde_json::to_value(result) {
            Ok(v) => JsonRpcResponse::success(id, v),
            Err(e) => JsonRpcResponse::error(
                id,
                error_codes::INTERNAL_ERROR,
                format!("Failed to serialize tool result: {}", e),
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tools::schema::ParamSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        schema: ToolSchema,
        calls: AtomicUsize,
    }

    impl CountingTool {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                schema: ToolSchema::new(name, "Counts calls").param(
                    ParamSpec::string("severity", "Severity")
                        .one_of(&["LOW", "HIGH"]),
                ),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl McpTool for CountingTool {
        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        async fn execute(&self, _arguments: Value) -> Result<McpToolResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(McpToolResult::text(format!("call {n}")))
        }
    }

    fn call(name: &str, arguments: Value) -> JsonRpcRequest {
        JsonRpcRequest::new("tools/call")
            .with_id(1)
            .with_params(serde_json::json!({"name": name, "arguments": arguments}))
    }

    #[tokio::test]
    async fn test_initialize_reports_server_info() {
        let server = McpServer::new("shipdeck-trivy", "0.1.0");
        let resp = server
            .handle_request(JsonRpcRequest::new("initialize").with_id(1))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "shipdeck-trivy");
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let server = McpServer::new("test", "0.1.0");
        for name in ["zeta_scan", "alpha_scan", "mid_scan"] {
            server.register_tool(CountingTool::named(name)).await.unwrap();
        }
        let resp = server
            .handle_request(JsonRpcRequest::new("tools/list").with_id(2))
            .await;
        let result = resp.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha_scan", "mid_scan", "zeta_scan"]);
        assert_eq!(result["tools"][0]["inputSchema"]["type"], "object");
    }

    #[tokio::test]
    async fn test_duplicate_rejected_by_default() {
        let server = McpServer::new("test", "0.1.0");
        server.register_tool(CountingTool::named("dup")).await.unwrap();
        let err = server
            .register_tool(CountingTool::named("dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(ref n) if n == "dup"));
    }

    #[tokio::test]
    async fn test_duplicate_replaced_when_configured() {
        let server = McpServer::new("test", "0.1.0").with_conflict_policy(ConflictPolicy::Replace);
        let first = CountingTool::named("dup");
        let second = CountingTool::named("dup");
        server.register_tool(first.clone()).await.unwrap();
        server.register_tool(second.clone()).await.unwrap();
        assert_eq!(server.tool_count().await, 1);

        server.handle_request(call("dup", serde_json::json!({}))).await;
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enum_violation_never_reaches_tool() {
        let server = McpServer::new("test", "0.1.0");
        let tool = CountingTool::named("scan");
        server.register_tool(tool.clone()).await.unwrap();

        let resp = server
            .handle_request(call("scan", serde_json::json!({"severity": "SEVERE"})))
            .await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);

        let resp = server
            .handle_request(call("scan", serde_json::json!({"severity": "HIGH"})))
            .await;
        assert_eq!(resp.result.unwrap()["content"][0]["text"], "call 1");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = McpServer::new("test", "0.1.0");
        let resp = server.handle_request(call("nope", Value::Null)).await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);

        let resp = server
            .handle_request(JsonRpcRequest::new("resources/list").with_id(3))
            .await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ping_and_notifications() {
        let server = McpServer::new("test", "0.1.0");
        let pong = server
            .handle_message(JsonRpcRequest::new("ping").with_id(9))
            .await
            .unwrap();
        assert_eq!(pong.result.unwrap(), serde_json::json!({}));
        assert!(
            server
                .handle_message(JsonRpcRequest::new("notifications/initialized"))
                .await
                .is_none()
        );
    }
}
