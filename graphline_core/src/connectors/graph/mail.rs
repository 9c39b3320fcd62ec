use rmcp::model::{CallToolResult, JsonObject};
use serde::Serialize;
use serde_json::{json, Value};

use super::client::{odata_literal, GraphClient};
use crate::error::ConnectorError;
use crate::utils::{optional_i64, optional_str, required_str, structured_result_with_text};

pub const DEFAULT_SEARCH_LIMIT: i64 = 5;
pub const MAX_SEARCH_LIMIT: i64 = 50;

const MAIL_FOOTER: &str = "This message was sent through MCP.";
const SEPARATOR: &str = "------------------------------";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSummary {
    pub subject: String,
    pub sender_name: String,
    pub sender_address: String,
    pub received: String,
}

impl MessageSummary {
    pub fn from_graph(message: &Value) -> Self {
        let sender = message.get("sender").and_then(|s| s.get("emailAddress"));
        let text = |v: Option<&Value>| v.and_then(|s| s.as_str()).map(|s| s.to_string());
        Self {
            subject: text(message.get("subject")).unwrap_or_else(|| "(no subject)".to_string()),
            sender_name: text(sender.and_then(|e| e.get("name")))
                .unwrap_or_else(|| "unknown".to_string()),
            sender_address: text(sender.and_then(|e| e.get("address"))).unwrap_or_default(),
            received: text(message.get("receivedDateTime")).unwrap_or_default(),
        }
    }
}

fn summaries(response: &Value) -> Vec<MessageSummary> {
    response
        .get("value")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().map(MessageSummary::from_graph).collect())
        .unwrap_or_default()
}

pub fn format_message_list(messages: &[MessageSummary]) -> String {
    let mut out = format!("Found {} recent messages:\n\n", messages.len());
    for (i, m) in messages.iter().enumerate() {
        out.push_str(&format!("{}. Subject: {}\n", i + 1, m.subject));
        out.push_str(&format!("   From: {} <{}>\n", m.sender_name, m.sender_address));
        out.push_str(&format!("   Received: {}\n", m.received));
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

/// Comma-separated addresses as Graph recipients; blank entries are skipped.
pub fn parse_recipients(list: &str) -> Vec<Value> {
    list.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| json!({ "emailAddress": { "address": addr } }))
        .collect()
}

pub async fn search_my_emails(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let limit = optional_i64(args, "limit")?
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let query = [
        ("$top", limit.to_string()),
        (
            "$filter",
            format!("from/emailAddress/address ne {}", odata_literal(mailbox)),
        ),
        ("$select", "subject,sender,receivedDateTime".to_string()),
    ];
    let response = client
        .get(&["users", mailbox, "messages"], &query, true)
        .await?;
    let messages = summaries(&response);
    let text = format_message_list(&messages);
    structured_result_with_text(
        &json!({ "count": messages.len(), "messages": messages }),
        Some(text),
    )
}

pub async fn search_unread_mail(
    client: &GraphClient,
    mailbox: &str,
) -> Result<CallToolResult, ConnectorError> {
    let query = [
        ("$filter", "isRead eq false".to_string()),
        ("$select", "subject,sender,receivedDateTime,isRead".to_string()),
        ("$orderby", "receivedDateTime desc".to_string()),
    ];
    let response = client
        .get(&["users", mailbox, "messages"], &query, true)
        .await?;
    let messages = summaries(&response);
    let text = if messages.is_empty() {
        "No unread messages.".to_string()
    } else {
        format_message_list(&messages)
    };
    structured_result_with_text(
        &json!({ "count": messages.len(), "messages": messages }),
        Some(text),
    )
}

pub async fn send_my_email(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let to_address = required_str(args, "to_address")?;
    let subject = required_str(args, "subject")?;
    let body = required_str(args, "body")?;

    let to_recipients = parse_recipients(to_address);
    if to_recipients.is_empty() {
        return Err(ConnectorError::InvalidParams(
            "to_address must contain at least one address".into(),
        ));
    }

    let mut message = json!({
        "subject": subject,
        "body": {
            "contentType": "Text",
            "content": format!("{}\n{}", body, MAIL_FOOTER),
        },
        "toRecipients": to_recipients,
    });
    let cc_recipients = optional_str(args, "cc_address")
        .map(parse_recipients)
        .unwrap_or_default();
    let cc_count = cc_recipients.len();
    if !cc_recipients.is_empty() {
        message["ccRecipients"] = Value::Array(cc_recipients);
    }

    let payload = json!({ "message": message, "saveToSentItems": true });
    let (status, _) = client
        .post(&["users", mailbox, "sendMail"], &payload)
        .await?;
    if status.as_u16() != 202 {
        return Err(ConnectorError::Upstream {
            status: status.as_u16(),
            body: "sendMail did not return 202 Accepted".into(),
        });
    }

    let to_count = payload["message"]["toRecipients"]
        .as_array()
        .map(|a| a.len())
        .unwrap_or(0);
    let text = format!(
        "Mail sent.\n- Recipients: {}\n- CC: {}\n- Subject: {}",
        to_count, cc_count, subject
    );
    structured_result_with_text(
        &json!({ "status": "sent", "to_count": to_count, "cc_count": cc_count }),
        Some(text),
    )
}
