use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::ConnectorError;

/// Tool result carrying both a readable text block and the structured data.
///
/// Non-object data is wrapped under a `data` key so `structured_content`
/// is always an object.
pub fn structured_result_with_text<T: Serialize>(
    data: &T,
    text: Option<String>,
) -> Result<CallToolResult, ConnectorError> {
    let value = serde_json::to_value(data)?;
    let map: JsonMap<String, JsonValue> = match value {
        JsonValue::Object(m) => m,
        other => {
            let mut m = JsonMap::new();
            m.insert("data".to_string(), other);
            m
        }
    };

    let content = match text {
        Some(text) => vec![Content::text(text)],
        None => Vec::new(),
    };

    Ok(CallToolResult {
        content,
        structured_content: Some(JsonValue::Object(map)),
        is_error: Some(false),
        meta: None,
    })
}

/// Input schema from a `json!` literal; anything but an object yields `{}`.
pub fn object_schema(value: JsonValue) -> Arc<JsonObject> {
    match value {
        JsonValue::Object(map) => Arc::new(map),
        _ => Arc::new(JsonMap::new()),
    }
}

/// Non-empty string argument.
pub fn required_str<'a>(args: &'a JsonObject, key: &str) -> Result<&'a str, ConnectorError> {
    optional_str(args, key)
        .ok_or_else(|| ConnectorError::InvalidParams(format!("{} is required", key)))
}

/// String argument; absent, null and blank all read as `None`.
pub fn optional_str<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn optional_i64(args: &JsonObject, key: &str) -> Result<Option<i64>, ConnectorError> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ConnectorError::InvalidParams(format!("{} must be an integer", key))),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ConnectorError::InvalidParams(format!("{} must be an integer", key))),
        Some(_) => Err(ConnectorError::InvalidParams(format!(
            "{} must be an integer",
            key
        ))),
    }
}

pub fn required_i64(args: &JsonObject, key: &str) -> Result<i64, ConnectorError> {
    optional_i64(args, key)?
        .ok_or_else(|| ConnectorError::InvalidParams(format!("{} is required", key)))
}

pub fn optional_bool(args: &JsonObject, key: &str) -> Result<Option<bool>, ConnectorError> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ConnectorError::InvalidParams(format!(
            "{} must be a boolean",
            key
        ))),
    }
}
