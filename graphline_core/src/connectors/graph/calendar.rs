use chrono::{Duration, SecondsFormat, Utc};
use rmcp::model::{CallToolResult, JsonObject};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::client::GraphClient;
use super::mail::parse_recipients;
use crate::error::ConnectorError;
use crate::utils::{optional_i64, optional_str, required_str, structured_result_with_text};

pub const DEFAULT_DAYS_AHEAD: i64 = 7;
pub const MAX_DAYS_AHEAD: i64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: String,
    pub subject: String,
    pub start: String,
    pub end: String,
    pub location: String,
}

impl EventSummary {
    pub fn from_graph(event: &Value) -> Self {
        let text = |v: Option<&Value>| {
            v.and_then(|s| s.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default()
        };
        Self {
            id: text(event.get("id")),
            subject: event
                .get("subject")
                .and_then(|s| s.as_str())
                .unwrap_or("(no subject)")
                .to_string(),
            start: text(event.get("start").and_then(|t| t.get("dateTime"))),
            end: text(event.get("end").and_then(|t| t.get("dateTime"))),
            location: text(event.get("location").and_then(|l| l.get("displayName"))),
        }
    }
}

fn date_time(value: &str, time_zone: &str) -> Value {
    json!({ "dateTime": value, "timeZone": time_zone })
}

fn text_body(content: &str) -> Value {
    json!({ "contentType": "Text", "content": content })
}

pub async fn list_events(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let days = optional_i64(args, "days_ahead")?
        .unwrap_or(DEFAULT_DAYS_AHEAD)
        .clamp(1, MAX_DAYS_AHEAD);
    let start = Utc::now();
    let end = start + Duration::days(days);
    let query = [
        ("startDateTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("endDateTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("$orderby", "start/dateTime".to_string()),
        ("$select", "id,subject,start,end,location".to_string()),
        ("$top", "50".to_string()),
    ];
    let response = client
        .get(&["users", mailbox, "calendarView"], &query, false)
        .await?;
    let events: Vec<EventSummary> = response
        .get("value")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().map(EventSummary::from_graph).collect())
        .unwrap_or_default();

    let text = if events.is_empty() {
        format!("No events in the next {} days.", days)
    } else {
        let mut out = format!("{} events in the next {} days:\n", events.len(), days);
        for e in &events {
            out.push_str(&format!("- {} | {} -> {}", e.subject, e.start, e.end));
            if !e.location.is_empty() {
                out.push_str(&format!(" @ {}", e.location));
            }
            out.push_str(&format!(" (id: {})\n", e.id));
        }
        out
    };
    structured_result_with_text(&json!({ "days_ahead": days, "events": events }), Some(text))
}

pub async fn create_event(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let subject = required_str(args, "subject")?;
    let start = required_str(args, "start")?;
    let end = required_str(args, "end")?;
    let time_zone = optional_str(args, "time_zone").unwrap_or("UTC");

    let mut event = json!({
        "subject": subject,
        "start": date_time(start, time_zone),
        "end": date_time(end, time_zone),
    });
    if let Some(location) = optional_str(args, "location") {
        event["location"] = json!({ "displayName": location });
    }
    if let Some(body) = optional_str(args, "body") {
        event["body"] = text_body(body);
    }
    if let Some(attendees) = optional_str(args, "attendees") {
        let list: Vec<Value> = parse_recipients(attendees)
            .into_iter()
            .map(|mut r| {
                r["type"] = json!("required");
                r
            })
            .collect();
        if !list.is_empty() {
            event["attendees"] = Value::Array(list);
        }
    }

    let (_, created) = client
        .post(&["users", mailbox, "events"], &event)
        .await?;
    let summary = EventSummary::from_graph(&created);
    let text = format!(
        "Event created: {} ({} -> {}), id: {}",
        summary.subject, summary.start, summary.end, summary.id
    );
    structured_result_with_text(&json!({ "event": summary }), Some(text))
}

pub async fn update_event(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let event_id = required_str(args, "event_id")?;
    let time_zone = optional_str(args, "time_zone").unwrap_or("UTC");

    let mut patch = Map::new();
    if let Some(subject) = optional_str(args, "subject") {
        patch.insert("subject".into(), json!(subject));
    }
    if let Some(start) = optional_str(args, "start") {
        patch.insert("start".into(), date_time(start, time_zone));
    }
    if let Some(end) = optional_str(args, "end") {
        patch.insert("end".into(), date_time(end, time_zone));
    }
    if let Some(location) = optional_str(args, "location") {
        patch.insert("location".into(), json!({ "displayName": location }));
    }
    if let Some(body) = optional_str(args, "body") {
        patch.insert("body".into(), text_body(body));
    }
    if patch.is_empty() {
        return Err(ConnectorError::InvalidParams(
            "nothing to update: pass at least one of subject, start, end, location, body".into(),
        ));
    }

    let updated_fields: Vec<String> = patch.keys().cloned().collect();
    let updated = client
        .patch(
            &["users", mailbox, "events", event_id],
            &Value::Object(patch),
        )
        .await?;
    let summary = EventSummary::from_graph(&updated);
    let text = format!("Event {} updated ({}).", event_id, updated_fields.join(", "));
    structured_result_with_text(
        &json!({ "event": summary, "updated_fields": updated_fields }),
        Some(text),
    )
}

pub async fn delete_event(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let event_id = required_str(args, "event_id")?;
    client
        .delete(&["users", mailbox, "events", event_id])
        .await?;
    structured_result_with_text(
        &json!({ "deleted": true, "event_id": event_id }),
        Some(format!("Event {} deleted.", event_id)),
    )
}
