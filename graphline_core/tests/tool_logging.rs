mod common;

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use graphline_core::connectors::system::SystemConnector;
use graphline_core::mcp_server::{JsonRpcHandler, McpServer};
use graphline_core::tool_logging::LoggedConnector;
use graphline_core::{
    CallToolRequestParam, CallToolResult, Connector, ConnectorError, ListToolsResult,
    PaginatedRequestParam, ProviderRegistry,
};
use serde_json::json;

use common::LogCapture;

/// Always fails, the way a Graph call does when the tenant refuses access.
struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn description(&self) -> &'static str {
        "refuses everything"
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        Ok(ListToolsResult {
            tools: vec![],
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        _request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        Err(ConnectorError::Upstream {
            status: 403,
            body: "Access is denied.".into(),
        })
    }
}

fn request(name: &'static str, args: serde_json::Value) -> CallToolRequestParam {
    CallToolRequestParam {
        name: Cow::Borrowed(name),
        arguments: args.as_object().cloned(),
    }
}

#[tokio::test]
async fn failure_logs_one_error_line_without_argument_values() {
    let logs = LogCapture::install();
    let connector = LoggedConnector::new(Box::new(RefusingConnector));

    let err = connector
        .call_tool(request(
            "send_my_email",
            json!({"to_address": "kim@example.com", "subject": "secret plans", "body": "hi"}),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Upstream { status: 403, .. }));

    let lines = logs.lines_containing("mcp_tool_call");
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert!(line.contains("| ERROR |"), "{}", line);
    assert!(line.contains("tool=graph/send_my_email status=error"));
    assert!(line.contains("\"to_address\""));
    assert!(line.contains("\"subject\""));
    assert!(line.contains("Access is denied."));
    assert!(!line.contains("kim@example.com"));
    assert!(!line.contains("secret plans"));
}

#[tokio::test]
async fn success_logs_info_line() {
    let logs = LogCapture::install();
    let connector = LoggedConnector::new(Box::new(SystemConnector::new()));

    let result = connector
        .call_tool(request("add", json!({"a": 40, "b": 2})))
        .await
        .unwrap();
    assert_eq!(result.structured_content, Some(json!({"result": 42})));

    let lines = logs.lines_containing("mcp_tool_call");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("| INFO  |"));
    assert!(lines[0].contains("tool=system/add status=success"));
    assert!(lines[0].contains("argument_keys=["));
    assert!(lines[0].contains("\"a\"") && lines[0].contains("\"b\""));
    assert!(!lines[0].contains("error="));
}

#[tokio::test]
async fn listing_is_not_logged_as_a_call() {
    let logs = LogCapture::install();
    let connector = LoggedConnector::new(Box::new(SystemConnector::new()));

    let tools = connector.list_tools(None).await.unwrap();
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(connector.name(), "system");
    assert!(logs.lines_containing("mcp_tool_call").is_empty());
}

fn dispatcher() -> JsonRpcHandler {
    let mut registry = ProviderRegistry::new();
    registry.register_provider(Box::new(LoggedConnector::new(Box::new(
        SystemConnector::new(),
    ))));
    JsonRpcHandler::new(McpServer::new(Arc::new(registry)))
}

#[tokio::test]
async fn every_failed_dispatch_logs_exactly_one_error_line() {
    let handler = dispatcher();

    for name in ["nope/add", "add", "system/nope", "/add"] {
        let logs = LogCapture::install();
        let reply = handler
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": name, "arguments": { "secret_value": "hunter2" } }
            }))
            .await;
        assert_eq!(reply["error"]["code"], -32602, "{}", name);

        let lines = logs.lines_containing("mcp_tool_call");
        assert_eq!(lines.len(), 1, "{}: {:?}", name, lines);
        assert!(lines[0].contains("| ERROR |"), "{}", lines[0]);
        assert!(lines[0].contains(&format!("tool={} status=error", name)));
        assert!(lines[0].contains("\"secret_value\""));
        assert!(!lines[0].contains("hunter2"));
    }
}

#[tokio::test]
async fn elapsed_time_keeps_sub_millisecond_precision() {
    let logs = LogCapture::install();
    let connector = LoggedConnector::new(Box::new(SystemConnector::new()));
    connector
        .call_tool(request("add", json!({"a": 1, "b": 2})))
        .await
        .unwrap();

    let line = logs.lines_containing("mcp_tool_call").remove(0);
    let elapsed = line
        .split_whitespace()
        .find_map(|field| field.strip_prefix("elapsed_ms="))
        .unwrap();
    let (whole, fraction) = elapsed.split_once('.').unwrap();
    assert!(whole.parse::<u64>().is_ok());
    assert_eq!(fraction.len(), 1);
}
