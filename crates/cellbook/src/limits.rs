//! Resource limits for sandboxed execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits applied to every execution.
///
/// There is no wall-clock timeout: a runaway loop is stopped by the loop
/// iteration limit, unbounded recursion by the recursion and stack limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum iterations of any single loop
    pub max_loop_iterations: u64,
    /// Maximum call depth
    pub max_recursion_depth: usize,
    /// Maximum size of the engine's value stack
    pub max_stack_size: usize,
    /// Maximum number of console entries kept per execution
    pub max_console_entries: usize,
    /// Executions slower than this are logged as a warning
    #[serde(with = "duration_ms")]
    pub slow_execution: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000_000,
            max_recursion_depth: 512,
            max_stack_size: 64 * 1024,
            max_console_entries: 1000,
            slow_execution: Duration::from_secs(2),
        }
    }
}

impl ResourceLimits {
    /// Limits with no practical bound on loops or console output.
    pub fn unlimited() -> Self {
        Self {
            max_loop_iterations: u64::MAX,
            max_recursion_depth: usize::MAX,
            max_stack_size: usize::MAX,
            max_console_entries: usize::MAX,
            slow_execution: Duration::MAX,
        }
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
