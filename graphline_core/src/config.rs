use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::ConnectorError;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Credentials and endpoints for the Graph connector.
#[derive(Clone)]
pub struct GraphSettings {
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
    /// Mailbox used when a tool call leaves `my_email` empty.
    pub default_user_email: String,
    pub graph_base_url: String,
    pub authority_host: String,
    pub request_timeout: Duration,
}

impl GraphSettings {
    pub fn new(
        client_id: impl Into<String>,
        tenant_id: impl Into<String>,
        client_secret: impl Into<String>,
        default_user_email: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            client_secret: client_secret.into(),
            default_user_email: default_user_email.into(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.graph_base_url = url.into();
        self
    }

    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConnectorError> {
        let required = [
            ("AZURE_CLIENT_ID", &self.client_id),
            ("AZURE_TENANT_ID", &self.tenant_id),
            ("AZURE_CLIENT_SECRET", &self.client_secret),
            ("DEFAULT_USER_EMAIL", &self.default_user_email),
            ("GRAPH_BASE_URL", &self.graph_base_url),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ConnectorError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

impl fmt::Debug for GraphSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphSettings")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &"<redacted>")
            .field("default_user_email", &self.default_user_email)
            .field("graph_base_url", &self.graph_base_url)
            .field("authority_host", &self.authority_host)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Where the streamable HTTP endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            path: "/mcp".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConnectorError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConnectorError::Config(format!("invalid listen host: {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
