//! The compile, execute and mount pipeline.
//!
//! ```rust,ignore
//! use cellbook::{CompilationRequest, Engine, Language};
//!
//! let engine = Engine::new();
//! let compiled = engine
//!     .compile(&CompilationRequest::new("console.log(1 + 1)", Language::JavaScript))
//!     .await;
//! let executed = engine.execute(&compiled).expect("compiled successfully");
//! assert_eq!(executed.console_entries.len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compiler::{self, CompilationRequest, CompilationResult};
use crate::gate::{CompilerLoader, DependencyGate};
use crate::limits::ResourceLimits;
use crate::render::{HtmlRenderer, Renderer};
use crate::sandbox::{Bindings, ExecutionResult, SandboxContext};

/// Which stage of the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The compiler service never became ready.
    DependencyUnavailable,
    /// The compiler rejected the source.
    Compilation,
    /// The executed code threw.
    Execution,
    /// The element tree could not be resolved or mounted.
    Mount,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::DependencyUnavailable => "dependency unavailable",
            ErrorKind::Compilation => "compilation error",
            ErrorKind::Execution => "execution error",
            ErrorKind::Mount => "mount error",
        })
    }
}

/// Outcome of [`Engine::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    /// The compilation step's result.
    pub compilation: CompilationResult,
    /// Present only when compilation succeeded.
    pub execution: Option<ExecutionResult>,
}

impl RunOutput {
    /// Whether both steps succeeded.
    pub fn success(&self) -> bool {
        self.compilation.success() && self.execution.as_ref().is_some_and(|e| e.success)
    }

    /// The first error message, if any step failed.
    pub fn error_message(&self) -> Option<&str> {
        match &self.execution {
            Some(execution) => execution.error_message.as_deref(),
            None => self.compilation.error_message(),
        }
    }

    /// Kind of the first error, if any step failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.execution {
            Some(execution) => execution.error_kind,
            None => self.compilation.error_kind(),
        }
    }
}

/// Outcome of [`Engine::mount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountResult {
    /// Whether the container now shows the element.
    pub success: bool,
    /// Target container.
    pub container: String,
    /// Why mounting failed.
    pub error_message: Option<String>,
    /// Always `Mount` on failure.
    pub error_kind: Option<ErrorKind>,
}

impl MountResult {
    fn failed(container: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            container: container.to_string(),
            error_message: Some(message.into()),
            error_kind: Some(ErrorKind::Mount),
        }
    }
}

/// Sandboxed execution engine.
///
/// Compilation waits on the [`DependencyGate`]; execution and mounting are
/// synchronous. Each execution gets its own realm, so an engine can be shared
/// freely between tasks.
pub struct Engine {
    gate: Arc<DependencyGate>,
    renderer: Arc<dyn Renderer>,
    limits: ResourceLimits,
    mirror_console: bool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("gate", &self.gate)
            .field("limits", &self.limits)
            .field("mirror_console", &self.mirror_console)
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the built-in compiler and an [`HtmlRenderer`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The gate in front of the compiler service.
    pub fn gate(&self) -> &Arc<DependencyGate> {
        &self.gate
    }

    /// The renderer used by [`mount`](Self::mount).
    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Limits applied to each execution.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Compile a request once the compiler service is ready.
    ///
    /// A gate that failed to load gives a result with
    /// [`ErrorKind::DependencyUnavailable`].
    pub async fn compile(&self, request: &CompilationRequest) -> CompilationResult {
        match self.gate.acquire().await {
            Ok(service) => compiler::compile(service.as_ref(), request),
            Err(e) => {
                tracing::debug!(error = %e, "compilation rejected");
                CompilationResult::failed(
                    ErrorKind::DependencyUnavailable,
                    e.to_string(),
                    request.language(),
                )
            }
        }
    }

    /// Run a successful compilation. Returns `None` for a failed one: code
    /// that did not compile is never executed.
    pub fn execute(&self, compiled: &CompilationResult) -> Option<ExecutionResult> {
        if !compiled.success() {
            return None;
        }
        let bindings = Bindings::for_language(compiled.language());
        let context = SandboxContext::new(bindings, &self.limits);
        let result = context.run(compiled.compiled_code());

        if self.mirror_console {
            for entry in &result.console_entries {
                entry.mirror();
            }
        }
        let elapsed = Duration::from_millis(result.stats.wall_time_ms);
        if elapsed > self.limits.slow_execution {
            tracing::warn!(elapsed_ms = result.stats.wall_time_ms, "slow execution");
        }
        tracing::debug!(
            success = result.success,
            entries = result.console_entries.len(),
            elapsed_ms = result.stats.wall_time_ms,
            "executed"
        );
        Some(result)
    }

    /// Compile and, if that succeeded, execute.
    pub async fn run(&self, request: &CompilationRequest) -> RunOutput {
        let compilation = self.compile(request).await;
        let execution = self.execute(&compilation);
        RunOutput {
            compilation,
            execution,
        }
    }

    /// Mount the element an execution produced into `container`.
    pub fn mount(&self, result: &ExecutionResult, container: &str) -> MountResult {
        if !result.success {
            return MountResult::failed(container, "cannot mount the output of a failed execution");
        }
        let Some(element) = &result.produced_element else {
            return MountResult::failed(container, "execution produced no element to mount");
        };
        match self.renderer.mount(element, container) {
            Ok(()) => MountResult {
                success: true,
                container: container.to_string(),
                error_message: None,
                error_kind: None,
            },
            Err(e) => {
                tracing::debug!(container, error = %e, "mount failed");
                MountResult::failed(container, e.to_string())
            }
        }
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    gate: Option<Arc<DependencyGate>>,
    renderer: Option<Arc<dyn Renderer>>,
    limits: ResourceLimits,
    mirror_console: bool,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("limits", &self.limits)
            .field("mirror_console", &self.mirror_console)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    /// Load the compiler with `loader` instead of the built-in one.
    pub fn loader(mut self, loader: impl CompilerLoader + 'static) -> Self {
        self.gate = Some(Arc::new(DependencyGate::new(loader)));
        self
    }

    /// Share an existing gate.
    pub fn gate(mut self, gate: Arc<DependencyGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Mount through `renderer`.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Apply `limits` to every execution.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Forward captured console entries to `tracing`.
    pub fn mirror_console(mut self, mirror: bool) -> Self {
        self.mirror_console = mirror;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Engine {
        Engine {
            gate: self.gate.unwrap_or_default(),
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(HtmlRenderer::new())),
            limits: self.limits,
            mirror_console: self.mirror_console,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::language::Language;
    use crate::sandbox::LogLevel;

    // ==== Pipeline Tests ====

    #[tokio::test]
    async fn test_run_javascript() {
        let engine = Engine::new();
        let output = engine
            .run(&CompilationRequest::new(
                "const sum = [1, 2, 3].reduce((a, b) => a + b);\nconsole.info('sum', sum);\nexport default sum;",
                Language::JavaScript,
            ))
            .await;

        assert!(output.success(), "{:?}", output.error_message());
        let execution = output.execution.unwrap();
        assert_eq!(execution.console_entries[0].level, LogLevel::Info);
        assert_eq!(execution.console_entries[0].args, [json!("sum"), json!(6)]);
        assert_eq!(execution.return_value, Some(json!(6)));
    }

    #[tokio::test]
    async fn test_failed_compilation_is_not_executed() {
        let engine = Engine::new();
        let output = engine
            .run(&CompilationRequest::new("let = ;", Language::TypeScript))
            .await;

        assert!(!output.success());
        assert!(output.execution.is_none());
        assert_eq!(output.error_kind(), Some(ErrorKind::Compilation));
    }

    #[tokio::test]
    async fn test_typescript_enum_runs() {
        let engine = Engine::new();
        let output = engine
            .run(&CompilationRequest::new(
                "enum Level { Low = 1, High }\nconst pick = (l: Level): string => Level[l];\nconsole.log(pick(Level.High));",
                Language::TypeScript,
            ))
            .await;

        let execution = output.execution.unwrap();
        assert!(execution.success, "{:?}", execution.error_message);
        assert_eq!(execution.console_entries[0].args, [json!("High")]);
    }

    // ==== Mount Tests ====

    #[tokio::test]
    async fn test_mount_is_explicit() {
        let renderer = Arc::new(HtmlRenderer::with_containers(["preview"]));
        let engine = Engine::builder().renderer(renderer.clone()).build();
        let output = engine
            .run(&CompilationRequest::new(
                "render(<ul>{['a', 'b'].map(x => <li key={x}>{x}</li>)}</ul>);",
                Language::React,
            ))
            .await;
        let execution = output.execution.unwrap();
        assert_eq!(renderer.html("preview").as_deref(), Some(""));

        let mounted = engine.mount(&execution, "preview");
        assert!(mounted.success, "{:?}", mounted.error_message);
        assert_eq!(
            renderer.html("preview").as_deref(),
            Some("<ul><li>a</li><li>b</li></ul>")
        );

        let missing = engine.mount(&execution, "nowhere");
        assert_eq!(missing.error_kind, Some(ErrorKind::Mount));
    }

    #[tokio::test]
    async fn test_mount_without_element() {
        let engine = Engine::new();
        let output = engine
            .run(&CompilationRequest::new("console.log(1);", Language::JavaScript))
            .await;

        let mounted = engine.mount(&output.execution.unwrap(), "root");
        assert!(!mounted.success);
        assert_eq!(mounted.error_kind, Some(ErrorKind::Mount));
    }

    #[test]
    fn test_error_kind_serde() {
        let json = serde_json::to_string(&ErrorKind::DependencyUnavailable).unwrap();
        assert_eq!(json, "\"dependency_unavailable\"");
    }
}
