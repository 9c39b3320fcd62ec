//! Process-wide log setup.
//!
//! Every record is written as
//! `<timestamp> | <LEVEL> | req=<correlation id> | <target> | <message>`
//! so lines emitted by different layers of one HTTP request can be joined.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::correlation;
use crate::error::ConnectorError;

/// Crates whose debug chatter is capped at `warn`.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls", "tower"];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info | LogLevel::Notice => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error | LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => {
                Level::ERROR
            }
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            "alert" => Ok(LogLevel::Alert),
            "emergency" => Ok(LogLevel::Emergency),
            other => Err(ConnectorError::Config(format!("unknown log level: {}", other))),
        }
    }
}

/// Logging settings handed to [`init`] once at startup.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Extra `EnvFilter` directives (typically `RUST_LOG`), applied last.
    pub directives: Option<String>,
}

impl LoggingConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            directives: None,
        }
    }

    pub fn env_filter(&self) -> EnvFilter {
        let level = self.level.as_tracing_level().to_string().to_lowercase();
        let mut spec = level;
        for target in QUIET_TARGETS {
            spec.push_str(&format!(",{}=warn", target));
        }
        if let Some(extra) = self.directives.as_deref().filter(|d| !d.trim().is_empty()) {
            spec.push(',');
            spec.push_str(extra);
        }
        EnvFilter::try_new(&spec).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Event formatter that stamps each line with the active correlation id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdFormat;

impl<S, N> FormatEvent<S, N> for RequestIdFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} | {:<5} | req={} | {} | ",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            meta.level(),
            correlation::current_request_id(),
            meta.target(),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Build the subscriber without installing it.
pub fn subscriber<W>(config: &LoggingConfig, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .event_format(RequestIdFormat)
        .finish()
}

/// Install the global subscriber, writing to stderr.
///
/// stdout is left alone because the stdio transport owns it.
pub fn init(config: &LoggingConfig) -> Result<(), ConnectorError> {
    tracing::subscriber::set_global_default(subscriber(config, std::io::stderr))
        .map_err(|e| ConnectorError::Config(format!("logging already initialized: {}", e)))
}
