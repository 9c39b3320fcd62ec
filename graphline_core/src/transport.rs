use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mcp_server::{parse_error_response, JsonRpcHandler};

/// Newline-delimited JSON-RPC over stdin/stdout.
///
/// stdout carries protocol traffic only. Nothing here opens a correlation
/// scope, so log lines from this transport carry `req=-`.
pub struct StdioTransport {
    handler: Arc<JsonRpcHandler>,
}

impl StdioTransport {
    pub fn new(handler: Arc<JsonRpcHandler>) -> Self {
        Self { handler }
    }

    /// Run until stdin reaches EOF
    pub async fn run(&self) -> io::Result<()> {
        info!("Starting stdio transport");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = AsyncBufReader::new(stdin);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("EOF reached on stdin");
                        break;
                    }
                    Ok(_) => {
                        if !line.trim().is_empty() && tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error reading from stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            for reply in self.process_line(&line).await {
                write_line(&mut stdout, &reply).await?;
            }
        }

        info!("stdio transport finished");
        Ok(())
    }

    /// Replies owed for one input line; empty when it held only notifications.
    pub async fn process_line(&self, line: &str) -> Vec<Value> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(batch)) => {
                let mut replies = Vec::new();
                for message in batch {
                    if let Some(reply) = self.handler.handle_message(message).await {
                        replies.push(reply);
                    }
                }
                if replies.is_empty() {
                    Vec::new()
                } else {
                    vec![Value::Array(replies)]
                }
            }
            Ok(message) => self.handler.handle_message(message).await.into_iter().collect(),
            Err(e) => {
                error!("Failed to parse JSON-RPC message: {}", e);
                vec![parse_error_response(e)]
            }
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, response: &Value) -> io::Result<()> {
    let response_str = serde_json::to_string(response)?;
    stdout.write_all(response_str.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    debug!("Sent response ({} bytes)", response_str.len());
    Ok(())
}
