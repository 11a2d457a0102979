//! Cellbook: sandboxed execution engine for notebook cells
//!
//! Cells written in JavaScript, TypeScript, React (JSX) or React with
//! TypeScript are compiled to plain JavaScript, run in an isolated realm that
//! captures console output and thrown errors, and may produce an element tree
//! that is mounted into a named container. Compilation waits behind a
//! [`DependencyGate`] until the compiler service has loaded.

mod compiler;
mod engine;
mod gate;
mod language;
mod limits;
mod render;
mod sandbox;
mod settings;

pub mod notebook;

pub use compiler::{
    CompilationRequest, CompilationResult, CompileError, Compiler, NativeCompiler,
    TransformOptions, TransformOutput, compile,
};
pub use engine::{Engine, EngineBuilder, ErrorKind, MountResult, RunOutput};
pub use gate::{BuiltinLoader, CompilerLoader, DependencyGate, GateError, GateState, LoadError};
pub use language::{
    CompileOptions, EnvOptions, JsxOptions, Language, Preset, PresetError, UnknownLanguage,
    validate_presets,
};
pub use limits::ResourceLimits;
pub use render::{HtmlRenderer, MountError, Renderer, render_html};
pub use sandbox::{
    Bindings, ConsoleEntry, Element, ExecutionResult, ExecutionStats, FRAGMENT_TAG, LogLevel,
    Node, SandboxContext,
};
pub use settings::{Settings, SettingsError, SettingsStore, Theme};
