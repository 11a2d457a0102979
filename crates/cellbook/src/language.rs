//! Source languages and the compiler presets they map to.
//!
//! Every [`Language`] maps to a fixed, ordered list of [`Preset`]s. The order is
//! part of the contract: type stripping runs before the JSX rewrite, and the
//! `env` preset always runs last.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The language a cell is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Plain JavaScript.
    #[serde(rename = "javascript", alias = "js")]
    JavaScript,
    /// TypeScript without JSX.
    #[serde(rename = "typescript", alias = "ts")]
    TypeScript,
    /// JavaScript with JSX.
    #[serde(rename = "react", alias = "jsx")]
    React,
    /// TypeScript with JSX.
    #[serde(rename = "react-typescript", alias = "tsx")]
    ReactTypeScript,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Language; 4] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::React,
        Language::ReactTypeScript,
    ];

    /// Canonical name, as used in notebooks and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::React => "react",
            Language::ReactTypeScript => "react-typescript",
        }
    }

    /// Whether the source may contain type syntax.
    pub fn is_typescript(&self) -> bool {
        matches!(self, Language::TypeScript | Language::ReactTypeScript)
    }

    /// Whether the source may contain JSX and renders UI.
    pub fn is_react(&self) -> bool {
        matches!(self, Language::React | Language::ReactTypeScript)
    }

    /// Guess the language from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "jsx" => Some(Language::React),
            "tsx" => Some(Language::ReactTypeScript),
            _ => None,
        }
    }

    /// The ordered preset pipeline for this language.
    pub fn presets(&self, options: &CompileOptions) -> Vec<Preset> {
        let jsx = JsxOptions {
            pragma: options.jsx_pragma.clone(),
            pragma_frag: options.jsx_fragment.clone(),
        };
        let env = Preset::Env(self.env_options());
        match self {
            Language::JavaScript => vec![env],
            Language::TypeScript => vec![Preset::TypeScript, env],
            Language::React => vec![Preset::React(jsx), env],
            Language::ReactTypeScript => vec![Preset::TypeScript, Preset::React(jsx), env],
        }
    }

    /// Modules that `import` declarations may name, mapped to the sandbox
    /// binding that provides them.
    fn env_options(&self) -> EnvOptions {
        let mut modules = BTreeMap::new();
        if self.is_react() {
            modules.insert("react".to_string(), "React".to_string());
        }
        EnvOptions { modules }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown language name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language `{0}` (expected javascript, typescript, react or react-typescript)")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "react" | "jsx" => Ok(Language::React),
            "react-typescript" | "react-ts" | "tsx" => Ok(Language::ReactTypeScript),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

/// Compiler flags carried by a compilation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Factory call emitted for JSX elements.
    pub jsx_pragma: String,
    /// Expression emitted as the type of JSX fragments.
    pub jsx_fragment: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            jsx_pragma: "React.createElement".to_string(),
            jsx_fragment: "React.Fragment".to_string(),
        }
    }
}

/// Options of the JSX rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsxOptions {
    /// Factory called for every element (classic runtime).
    pub pragma: String,
    /// Fragment type passed to the factory.
    pub pragma_frag: String,
}

impl Default for JsxOptions {
    fn default() -> Self {
        let options = CompileOptions::default();
        Self {
            pragma: options.jsx_pragma,
            pragma_frag: options.jsx_fragment,
        }
    }
}

/// Options of the module lowering performed by the `env` preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOptions {
    /// Importable module specifier -> sandbox binding name.
    pub modules: BTreeMap<String, String>,
}

/// One stage of the compiler pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "preset", rename_all = "lowercase")]
pub enum Preset {
    /// Strip type syntax.
    TypeScript,
    /// Rewrite JSX into factory calls.
    React(JsxOptions),
    /// Lower module syntax for function-scope execution.
    Env(EnvOptions),
}

impl Preset {
    /// Preset name as known to the compiler service.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::TypeScript => "typescript",
            Preset::React(_) => "react",
            Preset::Env(_) => "env",
        }
    }
}

/// Problems with a preset list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresetError {
    /// The same preset appears twice.
    #[error("preset `{0}` is listed more than once")]
    Duplicate(&'static str),
    /// The `env` preset is missing.
    #[error("preset list must end with `env`")]
    MissingEnv,
    /// The `env` preset is not the last one.
    #[error("preset `env` must run after `{0}`")]
    EnvNotLast(&'static str),
}

/// Check ordering invariants of a preset list.
pub fn validate_presets(presets: &[Preset]) -> Result<(), PresetError> {
    for (i, preset) in presets.iter().enumerate() {
        if presets[..i].iter().any(|p| p.name() == preset.name()) {
            return Err(PresetError::Duplicate(preset.name()));
        }
    }
    match presets.iter().position(|p| matches!(p, Preset::Env(_))) {
        None => Err(PresetError::MissingEnv),
        Some(i) if i + 1 != presets.len() => Err(PresetError::EnvNotLast(presets[i + 1].name())),
        Some(_) => Ok(()),
    }
}
