//! Execution sandbox for compiled cells.
//!
//! Each execution gets a fresh JavaScript realm through [`SandboxContext`].
//! The compiled body runs as a function whose parameters are the allow-listed
//! [`Bindings`]; console calls are captured as [`ConsoleEntry`]s and UI cells
//! produce an [`Element`] tree.

mod console;
mod element;
mod executor;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::ErrorKind;
use crate::language::Language;

pub use console::{ConsoleEntry, LogLevel};
pub use element::{Element, FRAGMENT_TAG, Node};
pub use executor::SandboxContext;

/// Capabilities passed to executed code, by parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bindings {
    /// `console` only.
    Console,
    /// `console`, the `React` element factory and `render`.
    Ui,
}

impl Bindings {
    /// The bindings a language's cells run with.
    pub fn for_language(language: Language) -> Self {
        if language.is_react() {
            Bindings::Ui
        } else {
            Bindings::Console
        }
    }

    /// Parameter names visible to the executed body.
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Bindings::Console => &["console"],
            Bindings::Ui => &["console", "React", "render"],
        }
    }
}

/// Statistics about one execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Wall clock time in milliseconds, including realm setup
    pub wall_time_ms: u64,
}

/// Result of running compiled code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the body ran to completion and its UI tree resolved
    pub success: bool,
    /// Console calls in call order
    pub console_entries: Vec<ConsoleEntry>,
    /// Message of the thrown value, if any
    pub error_message: Option<String>,
    /// `Execution` or `Mount` on failure
    pub error_kind: Option<ErrorKind>,
    /// Element tree produced by a UI cell
    pub produced_element: Option<Element>,
    /// Non-UI return value of the body
    pub return_value: Option<Value>,
    /// Whether console entries were dropped because of the entry cap
    pub truncated: bool,
    /// Execution statistics
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    /// Console entries at `level`.
    pub fn entries_at(&self, level: LogLevel) -> impl Iterator<Item = &ConsoleEntry> {
        self.console_entries.iter().filter(move |e| e.level == level)
    }
}
