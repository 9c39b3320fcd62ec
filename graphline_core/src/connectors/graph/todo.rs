use rmcp::model::{CallToolResult, JsonObject};
use serde::Serialize;
use serde_json::{json, Value};

use super::client::GraphClient;
use crate::error::ConnectorError;
use crate::utils::{optional_bool, optional_str, required_str, structured_result_with_text};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub due: Option<String>,
}

impl TaskSummary {
    pub fn from_graph(task: &Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(|s| s.as_str()).map(|s| s.to_string());
        Self {
            id: text(task.get("id")).unwrap_or_default(),
            title: text(task.get("title")).unwrap_or_default(),
            status: text(task.get("status")).unwrap_or_else(|| "notStarted".to_string()),
            due: text(task.get("dueDateTime").and_then(|d| d.get("dateTime"))),
        }
    }
}

fn values(response: &Value) -> &[Value] {
    response
        .get("value")
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[])
}

pub async fn list_todo_lists(
    client: &GraphClient,
    mailbox: &str,
) -> Result<CallToolResult, ConnectorError> {
    let response = client
        .get(&["users", mailbox, "todo", "lists"], &[], false)
        .await?;
    let lists: Vec<Value> = values(&response)
        .iter()
        .map(|l| {
            json!({
                "id": l.get("id").and_then(|s| s.as_str()).unwrap_or_default(),
                "name": l.get("displayName").and_then(|s| s.as_str()).unwrap_or_default(),
            })
        })
        .collect();

    let mut text = format!("{} task lists:\n", lists.len());
    for l in &lists {
        text.push_str(&format!(
            "- {} (id: {})\n",
            l["name"].as_str().unwrap_or_default(),
            l["id"].as_str().unwrap_or_default()
        ));
    }
    structured_result_with_text(&json!({ "lists": lists }), Some(text))
}

pub async fn list_todo_tasks(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let list_id = required_str(args, "list_id")?;
    let include_completed = optional_bool(args, "include_completed")?.unwrap_or(false);
    let mut query = Vec::new();
    if !include_completed {
        query.push(("$filter", "status ne 'completed'".to_string()));
    }
    let response = client
        .get(
            &["users", mailbox, "todo", "lists", list_id, "tasks"],
            &query,
            false,
        )
        .await?;
    let tasks: Vec<TaskSummary> = values(&response).iter().map(TaskSummary::from_graph).collect();

    let text = if tasks.is_empty() {
        "No tasks.".to_string()
    } else {
        let mut out = format!("{} tasks:\n", tasks.len());
        for t in &tasks {
            out.push_str(&format!("- [{}] {}", t.status, t.title));
            if let Some(due) = &t.due {
                out.push_str(&format!(" (due {})", due));
            }
            out.push_str(&format!(" (id: {})\n", t.id));
        }
        out
    };
    structured_result_with_text(&json!({ "list_id": list_id, "tasks": tasks }), Some(text))
}

pub async fn create_todo_task(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let list_id = required_str(args, "list_id")?;
    let title = required_str(args, "title")?;

    let mut task = json!({ "title": title });
    if let Some(due) = optional_str(args, "due_date") {
        // Graph wants a full timestamp; a bare date means midnight.
        let date_time = if due.contains('T') {
            due.to_string()
        } else {
            format!("{}T00:00:00", due)
        };
        task["dueDateTime"] = json!({ "dateTime": date_time, "timeZone": "UTC" });
    }
    if let Some(body) = optional_str(args, "body") {
        task["body"] = json!({ "contentType": "text", "content": body });
    }

    let (_, created) = client
        .post(&["users", mailbox, "todo", "lists", list_id, "tasks"], &task)
        .await?;
    let summary = TaskSummary::from_graph(&created);
    let text = format!("Task created: {} (id: {})", summary.title, summary.id);
    structured_result_with_text(&json!({ "task": summary }), Some(text))
}

pub async fn complete_todo_task(
    client: &GraphClient,
    mailbox: &str,
    args: &JsonObject,
) -> Result<CallToolResult, ConnectorError> {
    let list_id = required_str(args, "list_id")?;
    let task_id = required_str(args, "task_id")?;
    let updated = client
        .patch(
            &["users", mailbox, "todo", "lists", list_id, "tasks", task_id],
            &json!({ "status": "completed" }),
        )
        .await?;
    let summary = TaskSummary::from_graph(&updated);
    let text = format!("Task completed: {}", summary.title);
    structured_result_with_text(&json!({ "task": summary }), Some(text))
}
