//! The compilation step: turn author-facing source into executable JavaScript.
//!
//! The [`Compiler`] trait is the contract of the compiler service. It receives
//! the source text and an ordered preset list and returns the transformed code
//! or a diagnostic. [`NativeCompiler`] is the in-tree implementation; each
//! preset is one pass over a tree-sitter parse of the text, using the grammar
//! for the syntax that is still present in it.

mod emit;
mod rewrite;
mod syntax;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::ErrorKind;
use crate::language::{CompileOptions, Language, Preset, validate_presets};
use rewrite::Transforms;
use syntax::Syntax;

/// A diagnostic produced while compiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    /// Human readable description.
    pub message: String,
    /// 1-based line, or 0 when the error has no source location.
    pub line: usize,
    /// 1-based column, or 0 when the error has no source location.
    pub column: usize,
}

impl CompileError {
    /// Create an error without a source location.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    /// Create an error located at byte offset `pos` of `src`.
    pub(crate) fn at(src: &str, pos: usize, message: impl Into<String>) -> Self {
        let pos = pos.min(src.len());
        let before = &src[..pos];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            f.write_str(&self.message)
        } else {
            write!(f, "{} ({}:{})", self.message, self.line, self.column)
        }
    }
}

impl std::error::Error for CompileError {}

/// Options handed to the compiler service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Presets in execution order.
    pub presets: Vec<Preset>,
}

/// Output of the compiler service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Executable JavaScript.
    pub code: String,
}

/// Contract of the compiler service.
pub trait Compiler: Send + Sync {
    /// Transform `source` by running `options.presets` in order.
    fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> Result<TransformOutput, CompileError>;
}

/// In-tree TypeScript / JSX / module transpiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCompiler;

impl Compiler for NativeCompiler {
    fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> Result<TransformOutput, CompileError> {
        validate_presets(&options.presets).map_err(|e| CompileError::new(e.to_string()))?;

        let mut syntax = Syntax {
            typescript: options.presets.contains(&Preset::TypeScript),
            jsx: options
                .presets
                .iter()
                .any(|p| matches!(p, Preset::React(_))),
        };
        let mut code = source.to_string();
        for preset in &options.presets {
            let transforms = match preset {
                Preset::TypeScript => Transforms {
                    strip_types: true,
                    ..Transforms::default()
                },
                Preset::React(jsx) => Transforms {
                    jsx: Some(jsx.clone()),
                    ..Transforms::default()
                },
                Preset::Env(env) => Transforms {
                    modules: Some(env.clone()),
                    ..Transforms::default()
                },
            };
            code = rewrite::transform(&code, syntax, &transforms)?;
            match preset {
                Preset::TypeScript => syntax.typescript = false,
                Preset::React(_) => syntax.jsx = false,
                Preset::Env(_) => {}
            }
            tracing::trace!(preset = preset.name(), "compiler pass finished");
        }
        Ok(TransformOutput { code })
    }
}

/// A request to compile one piece of source. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationRequest {
    source_text: String,
    language: Language,
    #[serde(default)]
    options: CompileOptions,
}

impl CompilationRequest {
    /// Create a request with default compiler options.
    pub fn new(source_text: impl Into<String>, language: Language) -> Self {
        Self {
            source_text: source_text.into(),
            language,
            options: CompileOptions::default(),
        }
    }

    /// Replace the compiler options.
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// The source text.
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// The declared language.
    pub fn language(&self) -> Language {
        self.language
    }

    /// The compiler options.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Options for the compiler service.
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            presets: self.language.presets(&self.options),
        }
    }
}

/// Outcome of compiling one [`CompilationRequest`].
///
/// Fields are read-only: a successful result is the only way to obtain code
/// the sandbox will run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationResult {
    success: bool,
    compiled_code: String,
    error_message: Option<String>,
    error_kind: Option<ErrorKind>,
    language: Language,
}

impl CompilationResult {
    pub(crate) fn compiled(code: String, language: Language) -> Self {
        Self {
            success: true,
            compiled_code: code,
            error_message: None,
            error_kind: None,
            language,
        }
    }

    pub(crate) fn failed(kind: ErrorKind, message: impl Into<String>, language: Language) -> Self {
        Self {
            success: false,
            compiled_code: String::new(),
            error_message: Some(message.into()),
            error_kind: Some(kind),
            language,
        }
    }

    /// Whether compilation succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// The executable code; empty on failure.
    pub fn compiled_code(&self) -> &str {
        &self.compiled_code
    }

    /// The diagnostic, if compilation failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Which stage failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// The language the source was compiled from.
    pub fn language(&self) -> Language {
        self.language
    }
}

/// Compile a request with the given compiler service.
pub fn compile(compiler: &dyn Compiler, request: &CompilationRequest) -> CompilationResult {
    let language = request.language();
    if request.source_text().trim().is_empty() {
        return CompilationResult::failed(ErrorKind::Compilation, "Source text is empty", language);
    }
    match compiler.transform(request.source_text(), &request.transform_options()) {
        Ok(output) => {
            tracing::debug!(%language, bytes = output.code.len(), "compiled");
            CompilationResult::compiled(output.code, language)
        }
        Err(e) => {
            tracing::debug!(%language, error = %e, "compilation failed");
            CompilationResult::failed(ErrorKind::Compilation, e.to_string(), language)
        }
    }
}
