//! Log-safe views of request headers and payloads.
//!
//! Nothing in here ever returns a raw body. Headers are filtered through an
//! allow-list first and masked by name second; JSON values are masked by key
//! at every depth.

use std::collections::{BTreeMap, HashSet};

use axum::http::HeaderMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Replacement for any value whose key looks sensitive.
pub const MASK_TOKEN: &str = "***masked***";

/// Bodies larger than this are not inspected at all.
pub const MAX_BODY_LOG_BYTES: usize = 4096;

/// Bytes of a non-JSON body kept as a preview.
pub const MAX_PREVIEW_BYTES: usize = 200;

const ALLOWED_HEADER_KEYS: &[&str] = &[
    "user-agent",
    "content-type",
    "content-length",
    "x-request-id",
    "mcp-session-id",
];

const SENSITIVE_KEY_HINTS: &[&str] = &[
    "authorization",
    "cookie",
    "token",
    "secret",
    "password",
    "body",
    "my_email",
    "to_address",
    "cc_address",
];

/// Which headers may be logged and which names carry secrets.
#[derive(Debug, Clone)]
pub struct SanitizationPolicy {
    allowed_headers: HashSet<String>,
    sensitive_hints: Vec<String>,
}

impl Default for SanitizationPolicy {
    fn default() -> Self {
        Self::new(
            ALLOWED_HEADER_KEYS.iter().copied(),
            SENSITIVE_KEY_HINTS.iter().copied(),
        )
    }
}

impl SanitizationPolicy {
    /// Build a policy; both sets are stored lowercased.
    pub fn new<'a>(
        allowed_headers: impl IntoIterator<Item = &'a str>,
        sensitive_hints: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            allowed_headers: allowed_headers
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            sensitive_hints: sensitive_hints
                .into_iter()
                .map(|h| h.to_lowercase())
                .collect(),
        }
    }

    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_hints.iter().any(|hint| key.contains(hint))
    }

    /// Mask `value` according to `key`.
    ///
    /// Array elements have no name of their own, so they inherit the key of
    /// the array that holds them.
    pub fn mask_by_key(&self, key: &str, value: &Value) -> Value {
        if self.is_sensitive_key(key) {
            return Value::String(MASK_TOKEN.to_string());
        }

        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.mask_by_key(k, v)))
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.mask_by_key(key, item))
                    .collect(),
            ),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        }
    }

    /// Allow-listed headers only, with sensitive names masked.
    ///
    /// A header missing from the allow-list is dropped, not masked.
    pub fn extract_allowed_headers(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        let mut result = BTreeMap::new();
        for (name, value) in headers {
            let key = name.as_str().to_ascii_lowercase();
            if !self.allowed_headers.contains(&key) {
                continue;
            }
            let logged = if self.is_sensitive_key(&key) {
                MASK_TOKEN.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            result.insert(key, logged);
        }
        result
    }

    /// Summarize a request body for logging.
    pub fn summarize_payload(&self, raw: &[u8], content_type: Option<&str>) -> PayloadSummary {
        let mut summary = PayloadSummary {
            body_size: raw.len(),
            body_preview: None,
            rpc: None,
        };

        if raw.is_empty() {
            return summary;
        }

        if raw.len() > MAX_BODY_LOG_BYTES {
            summary.body_preview = Some(BodyPreview::OmittedTooLarge);
            return summary;
        }

        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);

        if is_json {
            match serde_json::from_slice::<Value>(raw) {
                Ok(Value::Object(payload)) => summary.rpc = Some(self.summarize_rpc(&payload)),
                Ok(_) => {}
                Err(_) => summary.body_preview = Some(BodyPreview::InvalidJson),
            }
            return summary;
        }

        let end = raw.len().min(MAX_PREVIEW_BYTES);
        summary.body_preview = Some(BodyPreview::Text(
            String::from_utf8_lossy(&raw[..end]).into_owned(),
        ));
        summary
    }

    fn summarize_rpc(&self, payload: &Map<String, Value>) -> RpcSummary {
        let params = match payload.get("params") {
            Some(Value::Object(params)) => Some(ParamsSummary {
                params_keys: params.keys().cloned().collect(),
                tool_name: params.get("name").cloned().unwrap_or(Value::Null),
                arguments: match params.get("arguments") {
                    Some(args @ Value::Object(_)) => Some(self.mask_by_key("arguments", args)),
                    _ => None,
                },
            }),
            _ => None,
        };

        RpcSummary {
            json_keys: payload.keys().cloned().collect(),
            rpc_method: payload.get("method").cloned().unwrap_or(Value::Null),
            rpc_id: payload.get("id").cloned().unwrap_or(Value::Null),
            params,
        }
    }
}

/// What the log line says about a body it does not print in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPreview {
    OmittedTooLarge,
    InvalidJson,
    Text(String),
}

impl BodyPreview {
    pub fn as_str(&self) -> &str {
        match self {
            BodyPreview::OmittedTooLarge => "omitted_too_large",
            BodyPreview::InvalidJson => "invalid_json",
            BodyPreview::Text(text) => text,
        }
    }
}

impl Serialize for BodyPreview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadSummary {
    pub body_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_preview: Option<BodyPreview>,
    #[serde(flatten)]
    pub rpc: Option<RpcSummary>,
}

impl PayloadSummary {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|_| serde_json::json!({ "body_size": self.body_size }))
    }
}

impl std::fmt::Display for PayloadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Structured view of a JSON-RPC object body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcSummary {
    pub json_keys: Vec<String>,
    pub rpc_method: Value,
    pub rpc_id: Value,
    #[serde(flatten)]
    pub params: Option<ParamsSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamsSummary {
    pub params_keys: Vec<String>,
    pub tool_name: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}
