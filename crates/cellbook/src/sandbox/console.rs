//! Captured console output.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a console call, named after the console method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
    /// `console.debug`
    Debug,
}

impl LogLevel {
    /// Method name on the console object.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intercepted console call.
///
/// `args` are snapshots taken at call time, so later mutation of a logged
/// object does not change the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Which console method was called.
    pub level: LogLevel,
    /// The call's arguments, in order.
    pub args: Vec<Value>,
}

impl ConsoleEntry {
    /// Create an entry.
    pub fn new(level: LogLevel, args: Vec<Value>) -> Self {
        Self { level, args }
    }

    /// The arguments joined the way a browser console prints them.
    pub fn message(&self) -> String {
        self.args
            .iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Forward the entry to `tracing` at the matching level.
    pub(crate) fn mirror(&self) {
        let message = self.message();
        match self.level {
            LogLevel::Error => tracing::error!(target: "cellbook::console", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "cellbook::console", "{message}"),
            LogLevel::Info | LogLevel::Log => {
                tracing::info!(target: "cellbook::console", "{message}")
            }
            LogLevel::Debug => tracing::debug!(target: "cellbook::console", "{message}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_joins_arguments() {
        let entry = ConsoleEntry::new(LogLevel::Log, vec![json!("a"), json!(1), json!({"k": [true]})]);
        assert_eq!(entry.message(), r#"a 1 {"k":[true]}"#);
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = ConsoleEntry::new(LogLevel::Warn, vec![json!(null)]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, json!({"level": "warn", "args": [null]}));
    }
}
