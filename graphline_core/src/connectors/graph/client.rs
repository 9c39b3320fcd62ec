use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::GraphSettings;
use crate::error::ConnectorError;
use crate::token::TokenProvider;

/// Thin authenticated wrapper over the Graph REST API.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl GraphClient {
    pub fn new(
        settings: &GraphSettings,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(ConnectorError::HttpRequest)?;
        let base_url = Url::parse(&settings.graph_base_url).map_err(|e| {
            ConnectorError::Config(format!(
                "GRAPH_BASE_URL is not a valid URL ({}): {}",
                e, settings.graph_base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConnectorError::Config(format!(
                "GRAPH_BASE_URL cannot carry a path: {}",
                settings.graph_base_url
            )));
        }
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Base URL plus `segments`, each percent-encoded as a single segment,
    /// so an id containing `/`, `?` or `#` cannot change the resource.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, ConnectorError> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .http
            .request(method, self.url(segments))
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    /// Send and read the body as JSON; an empty body reads as `null`.
    async fn execute(
        &self,
        builder: RequestBuilder,
    ) -> Result<(StatusCode, Value), ConnectorError> {
        let resp = builder.send().await.map_err(ConnectorError::HttpRequest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(ConnectorError::HttpRequest)?;
        debug!("graph responded {} ({} bytes)", status.as_u16(), text.len());

        if !status.is_success() {
            return Err(ConnectorError::Upstream {
                status: status.as_u16(),
                body: upstream_message(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok((status, Value::Null));
        }
        let value = serde_json::from_str(&text)?;
        Ok((status, value))
    }

    pub async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        eventual_consistency: bool,
    ) -> Result<Value, ConnectorError> {
        let mut builder = self.request(Method::GET, segments).await?.query(query);
        if eventual_consistency {
            builder = builder.header("ConsistencyLevel", "eventual");
        }
        self.execute(builder).await.map(|(_, v)| v)
    }

    pub async fn post(
        &self,
        segments: &[&str],
        body: &Value,
    ) -> Result<(StatusCode, Value), ConnectorError> {
        let builder = self.request(Method::POST, segments).await?.json(body);
        self.execute(builder).await
    }

    pub async fn patch(&self, segments: &[&str], body: &Value) -> Result<Value, ConnectorError> {
        let builder = self.request(Method::PATCH, segments).await?.json(body);
        self.execute(builder).await.map(|(_, v)| v)
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<StatusCode, ConnectorError> {
        let builder = self.request(Method::DELETE, segments).await?;
        self.execute(builder).await.map(|(status, _)| status)
    }
}

/// Prefer Graph's `error.message`; fall back to the raw body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

/// Quote a value for an OData string literal.
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
