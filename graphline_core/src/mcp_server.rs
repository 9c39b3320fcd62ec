use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::tool_logging;
use crate::{Connector, ConnectorError, ProviderRegistry};
use rmcp::model::*;

/// MCP server implementation that wraps the ProviderRegistry
pub struct McpServer {
    registry: Arc<ProviderRegistry>,
    server_info: Implementation,
    instructions: Option<String>,
}

impl McpServer {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            server_info: Implementation {
                name: "graphline".to_string(),
                title: Some("Graphline".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Microsoft 365 tools over Microsoft Graph: Outlook mail, calendar events \
                 and To Do tasks. Tool names are '<connector>/<tool>'. Leave my_email \
                 empty to act on the default mailbox."
                    .to_string(),
            ),
        }
    }

    /// Union of the capabilities advertised by every connector
    pub async fn get_capabilities(&self) -> ServerCapabilities {
        let mut capabilities = ServerCapabilities::default();

        for connector in self.registry.providers.values() {
            let conn_caps = connector.capabilities().await;
            if conn_caps.tools.is_some() {
                capabilities.tools = conn_caps.tools;
            }
            if conn_caps.resources.is_some() {
                capabilities.resources = conn_caps.resources;
            }
            if conn_caps.prompts.is_some() {
                capabilities.prompts = conn_caps.prompts;
            }
        }

        capabilities
    }

    pub async fn handle_initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!(
            "MCP client initializing: {} {}",
            request.client_info.name, request.client_info.version
        );

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.get_capabilities().await,
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    pub async fn handle_list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        let mut all_resources = Vec::new();

        for (name, connector) in self.registry.providers.iter() {
            match connector.list_resources(request.clone()).await {
                Ok(response) => all_resources.extend(response.resources),
                Err(e) => error!("Error listing resources from connector {}: {}", name, e),
            }
        }

        Ok(ListResourcesResult {
            resources: all_resources,
            next_cursor: None,
        })
    }

    /// Tools from every connector, each renamed to `<connector>/<tool>`
    pub async fn handle_list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let mut all_tools = Vec::new();

        for (connector_name, connector) in self.registry.providers.iter() {
            match connector.list_tools(request.clone()).await {
                Ok(response) => {
                    all_tools.extend(response.tools.into_iter().map(|mut tool| {
                        tool.name = format!("{}/{}", connector_name, tool.name).into();
                        tool
                    }));
                }
                Err(e) => {
                    error!(
                        "Error listing tools from connector {}: {}",
                        connector_name, e
                    );
                }
            }
        }

        Ok(ListToolsResult {
            tools: all_tools,
            next_cursor: None,
        })
    }

    /// Route `<connector>/<tool>` to the owning connector
    ///
    /// A name that is malformed or names no registered connector is logged
    /// here as a failed tool call; everything else is logged by the
    /// connector's own [`LoggedConnector`](crate::tool_logging::LoggedConnector).
    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let started = Instant::now();
        let (connector, tool_name) = match self.route(&request.name) {
            Ok(routed) => routed,
            Err(e) => {
                let keys = tool_logging::argument_keys(request.arguments.as_ref());
                tool_logging::record_call(&request.name, &keys, started, Some(&e));
                return Err(e);
            }
        };

        let unprefixed_request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments: request.arguments,
        };
        connector.call_tool(unprefixed_request).await
    }

    fn route<'a>(
        &self,
        name: &'a str,
    ) -> Result<(&Arc<dyn Connector>, &'a str), ConnectorError> {
        let (connector_name, tool_name) = name
            .split_once('/')
            .filter(|(c, t)| !c.is_empty() && !t.is_empty())
            .ok_or_else(|| {
                ConnectorError::InvalidParams(format!(
                    "Tool name must be in format 'connector/tool', got: {}",
                    name
                ))
            })?;
        let connector = self
            .registry
            .get_provider(connector_name)
            .ok_or(ConnectorError::ToolNotFound)?;
        Ok((connector, tool_name))
    }

    pub async fn handle_list_prompts(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        let mut all_prompts = Vec::new();

        for (connector_name, connector) in self.registry.providers.iter() {
            match connector.list_prompts(request.clone()).await {
                Ok(response) => {
                    all_prompts.extend(response.prompts.into_iter().map(|mut prompt| {
                        prompt.name = format!("{}/{}", connector_name, prompt.name);
                        prompt
                    }));
                }
                Err(e) => {
                    error!(
                        "Error listing prompts from connector {}: {}",
                        connector_name, e
                    );
                }
            }
        }

        Ok(ListPromptsResult {
            prompts: all_prompts,
            next_cursor: None,
        })
    }
}

/// A JSON-RPC object without an `id` expects no reply.
pub fn is_notification(message: &Value) -> bool {
    message.is_object() && message.get("id").is_none()
}

/// Reply for a message that could not be parsed at all.
pub fn parse_error_response(detail: impl std::fmt::Display) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": -32700,
            "message": "Parse error",
            "data": detail.to_string(),
        },
        "id": null,
    })
}

pub fn invalid_request_response(id: Option<Value>, detail: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": -32600, "message": "Invalid Request", "data": detail },
        "id": id,
    })
}

fn to_result<T: serde::Serialize>(outcome: Result<T, ConnectorError>) -> Result<Value, Value> {
    outcome
        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
        .map_err(|e| e.to_jsonrpc_error())
}

fn paginated(params: Value) -> Result<Option<PaginatedRequestParam>, Value> {
    if params.is_null() || params.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(None);
    }
    serde_json::from_value::<Option<PaginatedRequestParam>>(params)
        .map_err(|e| ConnectorError::SerdeJson(e).to_jsonrpc_error())
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process any inbound message; `None` when it was a notification.
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        if is_notification(&message) {
            self.handle_notification(message).await;
            None
        } else {
            Some(self.handle_request(message).await)
        }
    }

    async fn handle_notification(&self, notification: Value) {
        let method = notification
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("");
        match method {
            "notifications/initialized" => info!("MCP client finished initialization"),
            m if m.starts_with("notifications/") => debug!("Ignoring notification {}", m),
            _ => {
                // A request sent without an id still runs; its reply is dropped.
                let _ = self.handle_request(notification).await;
            }
        }
    }

    /// Process a JSON-RPC request and return a response
    pub async fn handle_request(&self, request: Value) -> Value {
        let Some(obj) = request.as_object() else {
            return invalid_request_response(None, "expected a JSON-RPC object");
        };

        let id = obj.get("id").cloned();
        let Some(method) = obj.get("method").and_then(|m| m.as_str()) else {
            return invalid_request_response(id, "missing method");
        };
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        debug!("Handling JSON-RPC method {}", method);

        let result = match method {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => to_result(self.server.handle_initialize(req).await),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "ping" => Ok(json!({})),
            "resources/list" => match paginated(params) {
                Ok(req) => to_result(self.server.handle_list_resources(req).await),
                Err(e) => Err(e),
            },
            "tools/list" => match paginated(params) {
                Ok(req) => to_result(self.server.handle_list_tools(req).await),
                Err(e) => Err(e),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => to_result(self.server.handle_call_tool(req).await),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "prompts/list" => match paginated(params) {
                Ok(req) => to_result(self.server.handle_list_prompts(req).await),
                Err(e) => Err(e),
            },
            _ => Err(ConnectorError::MethodNotFound.to_jsonrpc_error()),
        };

        match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        }
    }
}
