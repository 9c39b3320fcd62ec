#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use graphline_core::logging::{self, LogLevel, LoggingConfig};
use serde_json::Value;
use tracing::subscriber::DefaultGuard;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// In-memory log sink using the crate's own line format.
pub struct LogCapture {
    buf: SharedBuf,
    _guard: DefaultGuard,
}

impl LogCapture {
    /// Install for the current thread; dropped with the returned value.
    pub fn install() -> Self {
        let buf = SharedBuf::default();
        let sink = buf.clone();
        let subscriber =
            logging::subscriber(&LoggingConfig::new(LogLevel::Info), move || sink.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        Self { buf, _guard: guard }
    }

    pub fn lines(&self) -> Vec<String> {
        let raw = self.buf.0.lock().unwrap().clone();
        String::from_utf8_lossy(&raw)
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.contains(needle))
            .collect()
    }
}

/// The `req=<id>` column of a formatted line.
pub fn request_id_of(line: &str) -> &str {
    line.split(" | ")
        .find_map(|col| col.strip_prefix("req="))
        .unwrap_or("")
}

/// JSON value logged after `key=`, for the `headers=` and `payload=` fields.
pub fn json_field(line: &str, key: &str) -> Value {
    let marker = format!("{}=", key);
    let start = line.find(&marker).expect("field present") + marker.len();
    let rest = &line[start..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    stream.next().expect("json value").expect("valid json")
}
