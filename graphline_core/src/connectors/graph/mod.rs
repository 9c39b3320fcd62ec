use async_trait::async_trait;
use rmcp::model::*;
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;

use crate::config::GraphSettings;
use crate::error::ConnectorError;
use crate::token::TokenProvider;
use crate::utils::{object_schema, optional_str, structured_result_with_text};
use crate::Connector;

pub mod calendar;
pub mod client;
pub mod mail;
pub mod todo;

pub use client::GraphClient;

const MY_EMAIL_DESCRIPTION: &str =
    "Mailbox to act on (e.g. someone@contoso.com). Leave empty for the default user.";

/// Outlook mail, calendar and To Do through Microsoft Graph, app-only auth.
pub struct GraphConnector {
    client: GraphClient,
    default_user_email: String,
    client_id_configured: bool,
}

impl GraphConnector {
    pub fn new(
        settings: &GraphSettings,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: GraphClient::new(settings, tokens)?,
            default_user_email: settings.default_user_email.clone(),
            client_id_configured: !settings.client_id.trim().is_empty(),
        })
    }

    /// `my_email` when given and non-blank, else the configured default.
    fn mailbox<'a>(&'a self, args: &'a JsonObject) -> &'a str {
        optional_str(args, "my_email").unwrap_or(&self.default_user_email)
    }

    async fn ping(&self) -> Result<CallToolResult, ConnectorError> {
        self.client.tokens().access_token().await?;
        let text = format!(
            "pong: Graph mail server ready (client id configured: {})",
            self.client_id_configured
        );
        structured_result_with_text(
            &json!({ "ready": true, "client_id_configured": self.client_id_configured }),
            Some(text),
        )
    }
}

fn tool(name: &'static str, description: &'static str, schema: serde_json::Value) -> Tool {
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: object_schema(schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

#[async_trait]
impl Connector for GraphConnector {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn description(&self) -> &'static str {
        "Microsoft 365 via Microsoft Graph: Outlook mail, calendar events and To Do tasks."
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let my_email = json!({ "type": "string", "description": MY_EMAIL_DESCRIPTION });
        let tools = vec![
            tool(
                "ping",
                "Check that the server is configured and can obtain a Graph token.",
                json!({ "type": "object", "properties": {} }),
            ),
            tool(
                "search_my_emails",
                "Read the most recent received messages (subject, sender, received time). Messages sent by the mailbox owner are excluded.",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": { "type": "integer", "minimum": 1, "maximum": 50, "description": "Max messages (default 5)." },
                        "my_email": my_email
                    }
                }),
            ),
            tool(
                "search_unread_mail",
                "List unread messages, newest first.",
                json!({ "type": "object", "properties": { "my_email": my_email } }),
            ),
            tool(
                "send_my_email",
                "Send a plain-text email from the mailbox. Separate multiple recipients with commas.",
                json!({
                    "type": "object",
                    "properties": {
                        "to_address": { "type": "string", "description": "Recipients, comma-separated." },
                        "subject": { "type": "string" },
                        "body": { "type": "string", "description": "Plain text; use \\n for line breaks." },
                        "cc_address": { "type": "string", "description": "CC recipients, comma-separated." },
                        "my_email": my_email
                    },
                    "required": ["to_address", "subject", "body"]
                }),
            ),
            tool(
                "list_events",
                "List calendar events from now until days_ahead days from now.",
                json!({
                    "type": "object",
                    "properties": {
                        "days_ahead": { "type": "integer", "minimum": 1, "maximum": 90, "description": "Window in days (default 7)." },
                        "my_email": my_email
                    }
                }),
            ),
            tool(
                "create_event",
                "Create a calendar event. start/end are ISO-8601 local times in time_zone.",
                json!({
                    "type": "object",
                    "properties": {
                        "subject": { "type": "string" },
                        "start": { "type": "string", "description": "e.g. 2024-05-02T09:00:00" },
                        "end": { "type": "string" },
                        "time_zone": { "type": "string", "description": "IANA or Windows zone name (default UTC)." },
                        "location": { "type": "string" },
                        "body": { "type": "string" },
                        "attendees": { "type": "string", "description": "Attendee addresses, comma-separated." },
                        "my_email": my_email
                    },
                    "required": ["subject", "start", "end"]
                }),
            ),
            tool(
                "update_event",
                "Change fields of an existing event. Omitted fields are left as they are.",
                json!({
                    "type": "object",
                    "properties": {
                        "event_id": { "type": "string" },
                        "subject": { "type": "string" },
                        "start": { "type": "string" },
                        "end": { "type": "string" },
                        "time_zone": { "type": "string" },
                        "location": { "type": "string" },
                        "body": { "type": "string" },
                        "my_email": my_email
                    },
                    "required": ["event_id"]
                }),
            ),
            tool(
                "delete_event",
                "Delete a calendar event by id.",
                json!({
                    "type": "object",
                    "properties": { "event_id": { "type": "string" }, "my_email": my_email },
                    "required": ["event_id"]
                }),
            ),
            tool(
                "list_todo_lists",
                "List Microsoft To Do task lists.",
                json!({ "type": "object", "properties": { "my_email": my_email } }),
            ),
            tool(
                "list_todo_tasks",
                "List tasks in a To Do list. Completed tasks are hidden unless include_completed is true.",
                json!({
                    "type": "object",
                    "properties": {
                        "list_id": { "type": "string" },
                        "include_completed": { "type": "boolean" },
                        "my_email": my_email
                    },
                    "required": ["list_id"]
                }),
            ),
            tool(
                "create_todo_task",
                "Add a task to a To Do list.",
                json!({
                    "type": "object",
                    "properties": {
                        "list_id": { "type": "string" },
                        "title": { "type": "string" },
                        "due_date": { "type": "string", "description": "YYYY-MM-DD or full ISO-8601 timestamp." },
                        "body": { "type": "string" },
                        "my_email": my_email
                    },
                    "required": ["list_id", "title"]
                }),
            ),
            tool(
                "complete_todo_task",
                "Mark a To Do task as completed.",
                json!({
                    "type": "object",
                    "properties": {
                        "list_id": { "type": "string" },
                        "task_id": { "type": "string" },
                        "my_email": my_email
                    },
                    "required": ["list_id", "task_id"]
                }),
            ),
        ];

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
        let mailbox = self.mailbox(&args);
        let client = &self.client;
        match request.name.as_ref() {
            "ping" => self.ping().await,
            "search_my_emails" => mail::search_my_emails(client, mailbox, &args).await,
            "search_unread_mail" => mail::search_unread_mail(client, mailbox).await,
            "send_my_email" => mail::send_my_email(client, mailbox, &args).await,
            "list_events" => calendar::list_events(client, mailbox, &args).await,
            "create_event" => calendar::create_event(client, mailbox, &args).await,
            "update_event" => calendar::update_event(client, mailbox, &args).await,
            "delete_event" => calendar::delete_event(client, mailbox, &args).await,
            "list_todo_lists" => todo::list_todo_lists(client, mailbox).await,
            "list_todo_tasks" => todo::list_todo_tasks(client, mailbox, &args).await,
            "create_todo_task" => todo::create_todo_task(client, mailbox, &args).await,
            "complete_todo_task" => todo::complete_todo_task(client, mailbox, &args).await,
            _ => Err(ConnectorError::ToolNotFound),
        }
    }
}
