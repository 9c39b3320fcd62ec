use std::borrow::Cow;
use std::sync::Arc;

use graphline_core::config::GraphSettings;
use graphline_core::connectors::graph::GraphConnector;
use graphline_core::token::StaticTokenProvider;
use graphline_core::{CallToolRequestParam, CallToolResult, Connector, ConnectorError};
use serde_json::{json, Value};
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAILBOX: &str = "me@contoso.com";

fn connector(server: &MockServer) -> GraphConnector {
    let settings = GraphSettings::new("client", "tenant", "secret", MAILBOX)
        .with_graph_base_url(server.uri());
    GraphConnector::new(
        &settings,
        Arc::new(StaticTokenProvider("test-token".to_string())),
    )
    .unwrap()
}

async fn call(
    connector: &GraphConnector,
    name: &'static str,
    args: Value,
) -> Result<CallToolResult, ConnectorError> {
    connector
        .call_tool(CallToolRequestParam {
            name: Cow::Borrowed(name),
            arguments: args.as_object().cloned(),
        })
        .await
}

fn text_of(result: &CallToolResult) -> String {
    serde_json::to_value(&result.content).unwrap()[0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn recent_mail_uses_default_mailbox_and_excludes_own_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{}/messages", MAILBOX)))
        .and(header("authorization", "Bearer test-token"))
        .and(header("ConsistencyLevel", "eventual"))
        .and(query_param("$top", "5"))
        .and(query_param(
            "$filter",
            format!("from/emailAddress/address ne '{}'", MAILBOX),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "subject": "Quarterly report",
                "sender": { "emailAddress": { "name": "Kim", "address": "kim@example.com" } },
                "receivedDateTime": "2024-05-01T09:00:00Z"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(&connector(&server), "search_my_emails", json!({})).await.unwrap();
    assert!(text_of(&result).starts_with("Found 1 recent messages:"));
    let data = result.structured_content.unwrap();
    assert_eq!(data["count"], 1);
    assert_eq!(data["messages"][0]["sender_address"], "kim@example.com");
}

#[tokio::test]
async fn explicit_mailbox_and_limit_are_honored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/other@contoso.com/messages"))
        .and(query_param("$top", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(
        &connector(&server),
        "search_my_emails",
        json!({ "my_email": "other@contoso.com", "limit": 500 }),
    )
    .await
    .unwrap();
    assert_eq!(result.structured_content.unwrap()["count"], 0);
}

#[tokio::test]
async fn empty_unread_folder_says_so() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{}/messages", MAILBOX)))
        .and(query_param("$filter", "isRead eq false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let result = call(&connector(&server), "search_unread_mail", json!({ "my_email": "  " }))
        .await
        .unwrap();
    assert_eq!(text_of(&result), "No unread messages.");
}

#[tokio::test]
async fn send_mail_appends_footer_and_cc() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/users/{}/sendMail", MAILBOX)))
        .and(body_string_contains("This message was sent through MCP."))
        .and(body_partial_json(json!({
            "saveToSentItems": true,
            "message": {
                "subject": "Lunch",
                "ccRecipients": [{ "emailAddress": { "address": "cc@example.com" } }]
            }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(
        &connector(&server),
        "send_my_email",
        json!({
            "to_address": "a@example.com, b@example.com",
            "subject": "Lunch",
            "body": "Noon?",
            "cc_address": "cc@example.com"
        }),
    )
    .await
    .unwrap();
    let data = result.structured_content.unwrap();
    assert_eq!(data["to_count"], 2);
    assert_eq!(data["cc_count"], 1);
}

#[tokio::test]
async fn send_mail_requires_recipients() {
    let server = MockServer::start().await;
    let err = call(
        &connector(&server),
        "send_my_email",
        json!({ "to_address": " , ", "subject": "x", "body": "y" }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidParams(_)));
}

#[tokio::test]
async fn graph_refusal_becomes_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{}/todo/lists", MAILBOX)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "ErrorAccessDenied", "message": "Access is denied." }
        })))
        .mount(&server)
        .await;

    let err = call(&connector(&server), "list_todo_lists", json!({}))
        .await
        .unwrap_err();
    match err {
        ConnectorError::Upstream { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "Access is denied.");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn update_event_without_fields_is_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = call(&connector(&server), "update_event", json!({ "event_id": "evt-1" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidParams(_)));
}

#[tokio::test]
async fn create_event_marks_attendees_required() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/users/{}/events", MAILBOX)))
        .and(body_partial_json(json!({
            "start": { "dateTime": "2024-05-02T09:00:00", "timeZone": "Europe/Berlin" },
            "attendees": [{ "emailAddress": { "address": "kim@example.com" }, "type": "required" }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "evt-9",
            "subject": "Sync",
            "start": { "dateTime": "2024-05-02T09:00:00" },
            "end": { "dateTime": "2024-05-02T09:30:00" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(
        &connector(&server),
        "create_event",
        json!({
            "subject": "Sync",
            "start": "2024-05-02T09:00:00",
            "end": "2024-05-02T09:30:00",
            "time_zone": "Europe/Berlin",
            "attendees": "kim@example.com"
        }),
    )
    .await
    .unwrap();
    assert_eq!(result.structured_content.unwrap()["event"]["id"], "evt-9");
}

#[tokio::test]
async fn delete_event_accepts_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/users/{}/events/evt-1", MAILBOX)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(&connector(&server), "delete_event", json!({ "event_id": "evt-1" }))
        .await
        .unwrap();
    assert_eq!(result.structured_content.unwrap()["deleted"], true);
}

#[tokio::test]
async fn bare_due_date_becomes_midnight_utc() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/users/{}/todo/lists/list-1/tasks", MAILBOX)))
        .and(body_partial_json(json!({
            "title": "Renew badge",
            "dueDateTime": { "dateTime": "2024-06-01T00:00:00", "timeZone": "UTC" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "task-1",
            "title": "Renew badge",
            "status": "notStarted",
            "dueDateTime": { "dateTime": "2024-06-01T00:00:00.0000000", "timeZone": "UTC" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(
        &connector(&server),
        "create_todo_task",
        json!({ "list_id": "list-1", "title": "Renew badge", "due_date": "2024-06-01" }),
    )
    .await
    .unwrap();
    assert_eq!(text_of(&result), "Task created: Renew badge (id: task-1)");
}

#[tokio::test]
async fn completed_tasks_hidden_unless_requested() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{}/todo/lists/list-1/tasks", MAILBOX)))
        .and(query_param("$filter", "status ne 'completed'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{}/todo/lists/list-2/tasks", MAILBOX)))
        .and(query_param_is_missing("$filter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "t1", "title": "Done thing", "status": "completed" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(&server);
    let hidden = call(&connector, "list_todo_tasks", json!({ "list_id": "list-1" }))
        .await
        .unwrap();
    assert_eq!(text_of(&hidden), "No tasks.");

    let all = call(
        &connector,
        "list_todo_tasks",
        json!({ "list_id": "list-2", "include_completed": true }),
    )
    .await
    .unwrap();
    assert!(text_of(&all).contains("[completed] Done thing"));
}

#[tokio::test]
async fn ping_reports_readiness() {
    let server = MockServer::start().await;
    let result = call(&connector(&server), "ping", json!({})).await.unwrap();
    assert!(text_of(&result).starts_with("pong"));
    assert_eq!(result.structured_content.unwrap()["ready"], true);
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let server = MockServer::start().await;
    let err = call(&connector(&server), "teleport", json!({})).await.unwrap_err();
    assert!(matches!(err, ConnectorError::ToolNotFound));
}

#[tokio::test]
async fn ids_cannot_escape_their_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!(
            "/users/{}/todo/lists/list%2F..%2Fx/tasks/t%3Fa%23b",
            MAILBOX
        )))
        .and(query_param_is_missing("a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t?a#b",
            "title": "Odd id",
            "status": "completed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(
        &connector(&server),
        "complete_todo_task",
        json!({ "list_id": "list/../x", "task_id": "t?a#b" }),
    )
    .await
    .unwrap();
    assert_eq!(text_of(&result), "Task completed: Odd id");
}
