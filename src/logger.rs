use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

pub enum MessageLogMode {
    Full,
    Redacted,
}

/// Keys masked in `Redacted` mode. Vendor payloads carry credentials in
/// PascalCase; the match is exact, not case-folded.
const REDACTED_KEYS: [&str; 3] = ["Email", "Password", "SessionId"];

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { mode, file })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let body = body.map(|b| self.scrub(b));
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, status: u16, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "resp",
            "status": status,
            "body": self.scrub(body),
        });
        self.write_line(&entry);
    }

    fn scrub(&self, body: &Value) -> Value {
        match self.mode {
            MessageLogMode::Full => body.clone(),
            MessageLogMode::Redacted => {
                let mut scrubbed = body.clone();
                redact_keys(&mut scrubbed);
                scrubbed
            }
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

fn redact_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if REDACTED_KEYS.contains(&key.as_str()) {
                    *entry = Value::String("***".to_string());
                } else {
                    redact_keys(entry);
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries.iter_mut() {
                redact_keys(entry);
            }
        }
        _ => {}
    }
}
