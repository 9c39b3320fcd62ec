use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};

use graphline_core::{
    config::{GraphSettings, HttpConfig, DEFAULT_AUTHORITY_HOST, DEFAULT_GRAPH_BASE_URL},
    http,
    logging::{self, LogLevel, LoggingConfig},
    mcp_server::{JsonRpcHandler, McpServer},
    sanitize::SanitizationPolicy,
    token::{ClientCredentialsProvider, TokenProvider},
    transport::StdioTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// Streamable HTTP on --host/--port
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
}

#[derive(Parser, Debug)]
#[command(
    name = "graphline_mcp",
    version,
    about = "Outlook mail, calendar and To Do tools over MCP"
)]
struct Args {
    #[arg(long, env = "AZURE_CLIENT_ID")]
    client_id: String,

    #[arg(long, env = "AZURE_TENANT_ID")]
    tenant_id: String,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Mailbox used when a tool call does not name one
    #[arg(long, env = "DEFAULT_USER_EMAIL")]
    default_user_email: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Extra tracing filter directives, e.g. `graphline_core=debug`
    #[arg(long, env = "RUST_LOG")]
    log_filter: Option<String>,

    #[arg(long, env = "GRAPH_BASE_URL", default_value = DEFAULT_GRAPH_BASE_URL)]
    graph_base_url: String,

    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    authority_host: String,

    #[arg(long, value_enum, default_value_t = TransportKind::Http)]
    transport: TransportKind,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    logging::init(&LoggingConfig {
        level: args.log_level,
        directives: args.log_filter.clone(),
    })?;

    info!("Starting Graphline MCP Server");

    let settings = GraphSettings::new(
        args.client_id,
        args.tenant_id,
        args.client_secret,
        args.default_user_email,
    )
    .with_graph_base_url(args.graph_base_url)
    .with_authority_host(args.authority_host);
    settings.validate()?;
    info!("Graph settings loaded: {:?}", settings);

    let tokens: Arc<dyn TokenProvider> =
        Arc::new(ClientCredentialsProvider::from_settings(&settings)?);
    let registry = graphline_core::build_registry(&settings, tokens)?;
    let server = McpServer::new(Arc::new(registry));
    let handler = Arc::new(JsonRpcHandler::new(server));

    match args.transport {
        TransportKind::Stdio => {
            info!("MCP Server ready, listening on stdio");
            if let Err(e) = StdioTransport::new(handler).run().await {
                error!("Transport error: {}", e);
                return Err(e.into());
            }
        }
        TransportKind::Http => {
            let config = HttpConfig {
                host: args.host,
                port: args.port,
                ..HttpConfig::default()
            };
            let policy = Arc::new(SanitizationPolicy::default());
            let router = http::router(handler, &config, policy);
            if let Err(e) = http::serve(router, &config, shutdown_signal()).await {
                error!("Transport error: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("Graphline MCP Server stopped");
    Ok(())
}
