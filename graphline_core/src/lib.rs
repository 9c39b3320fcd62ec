// src/lib.rs
pub mod config;
pub mod connectors;
pub mod correlation;
pub mod error;
pub mod http;
pub mod logging;
pub mod mcp_server;
pub mod sanitize;
pub mod token;
pub mod tool_logging;
pub mod transport;
pub mod utils;

use std::collections::BTreeMap;
use std::sync::Arc;

// Re-export types from rmcp that users of the library need
pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, JsonObject, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, Tool,
};

pub use crate::error::ConnectorError;
use async_trait::async_trait;

use crate::config::GraphSettings;
use crate::connectors::{graph::GraphConnector, system::SystemConnector};
use crate::token::TokenProvider;
use crate::tool_logging::LoggedConnector;

/// A named group of MCP tools.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique name, used as the tool-name prefix (`<name>/<tool>`).
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(Default::default()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError>;

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError>;

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        Ok(ListResourcesResult {
            resources: vec![],
            next_cursor: None,
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        Ok(ListPromptsResult {
            prompts: vec![],
            next_cursor: None,
        })
    }
}

/// Connectors by name. Built once at startup and shared read-only.
pub struct ProviderRegistry {
    pub providers: BTreeMap<String, Arc<dyn Connector>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: BTreeMap::new(),
        }
    }

    pub fn register_provider(&mut self, provider: Box<dyn Connector>) {
        self.providers
            .insert(provider.name().to_string(), Arc::from(provider));
    }

    pub fn get_provider(&self, name: &str) -> Option<&Arc<dyn Connector>> {
        self.providers.get(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the Graph and system connectors, each behind tool-call logging.
pub fn build_registry(
    settings: &GraphSettings,
    tokens: Arc<dyn TokenProvider>,
) -> Result<ProviderRegistry, ConnectorError> {
    let mut registry = ProviderRegistry::new();

    let graph = GraphConnector::new(settings, tokens)?;
    registry.register_provider(Box::new(LoggedConnector::new(Box::new(graph))));
    registry.register_provider(Box::new(LoggedConnector::new(Box::new(
        SystemConnector::new(),
    ))));

    Ok(registry)
}
