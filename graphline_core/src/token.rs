//! Bearer tokens for Microsoft Graph.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{GraphSettings, GRAPH_DEFAULT_SCOPE};
use crate::error::ConnectorError;

/// Tokens are refreshed this many seconds before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 60;
const DEFAULT_EXPIRES_IN: i64 = 3600;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, ConnectorError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// OAuth2 client-credentials grant against the Entra ID token endpoint.
pub struct ClientCredentialsProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsProvider {
    pub fn from_settings(settings: &GraphSettings) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(ConnectorError::HttpRequest)?;
        Ok(Self {
            http,
            token_url: settings.token_url(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            scope: GRAPH_DEFAULT_SCOPE.to_string(),
            cache: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<CachedToken, ConnectorError> {
        info!("requesting a new client-credentials token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(ConnectorError::HttpRequest)?;
        let status = resp.status();
        let v = resp
            .json::<Value>()
            .await
            .map_err(|e| {
                ConnectorError::Authentication(format!("unreadable token response: {}", e))
            })?;
        if !status.is_success() {
            let reason = v
                .get("error_description")
                .or_else(|| v.get("error"))
                .and_then(|s| s.as_str())
                .unwrap_or("unknown error");
            return Err(ConnectorError::Authentication(format!(
                "token request failed ({}): {}",
                status.as_u16(),
                reason
            )));
        }
        let access_token = v
            .get("access_token")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConnectorError::Authentication("token response had no access_token".into())
            })?
            .to_string();
        let expires_in = v
            .get("expires_in")
            .and_then(|i| i.as_i64().or_else(|| i.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(DEFAULT_EXPIRES_IN);
        Ok(CachedToken {
            access_token,
            expires_at: now_epoch() + expires_in - EXPIRY_SKEW_SECS,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn access_token(&self) -> Result<String, ConnectorError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(now_epoch())) {
            debug!("reusing cached access token");
            return Ok(token.access_token.clone());
        }
        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }
}

/// Fixed token, for tests and local development against a stub Graph.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider(pub String);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, ConnectorError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> GraphSettings {
        GraphSettings::new("client-1", "tenant-1", "s3cret", "me@example.com")
            .with_authority_host(server.uri())
    }

    #[tokio::test]
    async fn caches_token_until_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClientCredentialsProvider::from_settings(&settings_for(&server)).unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "tok-1");
        assert_eq!(provider.access_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn short_lived_tokens_are_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-short",
                "expires_in": 30
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = ClientCredentialsProvider::from_settings(&settings_for(&server)).unwrap();
        provider.access_token().await.unwrap();
        provider.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn failure_surfaces_error_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let provider = ClientCredentialsProvider::from_settings(&settings_for(&server)).unwrap();
        let err = provider.access_token().await.unwrap_err();
        assert_eq!(err.code_str(), "auth_failed");
        assert!(err.to_string().contains("Invalid client secret"));
    }
}
