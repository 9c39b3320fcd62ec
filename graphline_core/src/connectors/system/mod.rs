use async_trait::async_trait;
use rmcp::model::*;
use serde_json::json;
use std::borrow::Cow;

use crate::error::ConnectorError;
use crate::utils::{object_schema, required_i64, structured_result_with_text};
use crate::Connector;

/// Credential-free tools, handy for checking that a client is wired up.
#[derive(Debug, Clone, Default)]
pub struct SystemConnector;

impl SystemConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SystemConnector {
    fn name(&self) -> &'static str {
        "system"
    }

    fn description(&self) -> &'static str {
        "Utility tools that do not touch Microsoft Graph."
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let tools = vec![Tool {
            name: Cow::Borrowed("add"),
            title: None,
            description: Some(Cow::Borrowed("Add two integers.")),
            input_schema: object_schema(json!({
                "type": "object",
                "properties": {
                    "a": { "type": "integer" },
                    "b": { "type": "integer" }
                },
                "required": ["a", "b"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        }];

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let args = request.arguments.unwrap_or_default();
        match request.name.as_ref() {
            "add" => {
                let a = required_i64(&args, "a")?;
                let b = required_i64(&args, "b")?;
                let sum = a
                    .checked_add(b)
                    .ok_or_else(|| ConnectorError::InvalidParams("a + b overflows".into()))?;
                structured_result_with_text(&json!({ "result": sum }), Some(sum.to_string()))
            }
            _ => Err(ConnectorError::ToolNotFound),
        }
    }
}
