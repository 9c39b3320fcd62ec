//! Per-tool call logging.
//!
//! [`LoggedConnector`] sits between the MCP dispatcher and a real connector.
//! It records which tool ran, which argument names were passed, how long it
//! took and whether it failed. Argument values never reach the log.
//! Calls the dispatcher rejects before routing go through [`record_call`].

use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
    CallToolRequestParam, CallToolResult, Connector, ConnectorError, JsonObject,
    ListPromptsResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities,
};

const TARGET: &str = "graphline::tool";

/// Names of the arguments passed to a tool, never their values.
pub fn argument_keys(arguments: Option<&JsonObject>) -> Vec<String> {
    arguments
        .map(|args| args.keys().cloned().collect())
        .unwrap_or_default()
}

/// Write the `mcp_tool_call` line for one finished call.
///
/// Also used by the dispatcher for calls rejected before a connector is
/// chosen, so every failed `tools/call` yields exactly one error line.
pub fn record_call(
    tool: &str,
    argument_keys: &[String],
    started: Instant,
    failure: Option<&ConnectorError>,
) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match failure {
        None => info!(
            target: TARGET,
            "mcp_tool_call tool={} status=success elapsed_ms={:.1} argument_keys={:?}",
            tool,
            elapsed_ms,
            argument_keys
        ),
        Some(e) => error!(
            target: TARGET,
            "mcp_tool_call tool={} status=error elapsed_ms={:.1} argument_keys={:?} error={}",
            tool,
            elapsed_ms,
            argument_keys,
            e
        ),
    }
}

pub struct LoggedConnector {
    inner: Box<dyn Connector>,
}

impl LoggedConnector {
    pub fn new(inner: Box<dyn Connector>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Connector for LoggedConnector {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    async fn capabilities(&self) -> ServerCapabilities {
        self.inner.capabilities().await
    }

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        self.inner.list_tools(request).await
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let tool = format!("{}/{}", self.inner.name(), request.name);
        let keys = argument_keys(request.arguments.as_ref());

        let started = Instant::now();
        let result = self.inner.call_tool(request).await;
        record_call(&tool, &keys, started, result.as_ref().err());
        result
    }

    async fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        self.inner.list_resources(request).await
    }

    async fn list_prompts(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        self.inner.list_prompts(request).await
    }
}
