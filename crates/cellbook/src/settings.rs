//! Editor and runtime settings persisted as a JSON file.
//!
//! Loading never fails: a missing file gives the defaults, and an unreadable
//! or malformed one gives the defaults with a warning, the way browser local
//! storage behaves when its entry is absent or corrupt.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::language::Language;

/// Errors that can occur while saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Serialization error
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Color scheme of the editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light background.
    #[default]
    Light,
    /// Dark background.
    Dark,
}

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Editor color scheme.
    pub theme: Theme,
    /// Editor font size in pixels, 8 to 48.
    pub font_size: u8,
    /// Spaces per tab, 1 to 8.
    pub tab_size: u8,
    /// Soft-wrap long lines.
    pub word_wrap: bool,
    /// Language of new cells and of files with an unknown extension.
    pub default_language: Language,
    /// Run cells as soon as they are opened.
    pub auto_run: bool,
    /// Mount UI output after a successful run.
    pub auto_mount: bool,
    /// Forward captured console output to the log.
    pub mirror_console: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size: 14,
            tab_size: 2,
            word_wrap: true,
            default_language: Language::JavaScript,
            auto_run: false,
            auto_mount: true,
            mirror_console: false,
        }
    }
}

impl Settings {
    /// Clamp numeric fields into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.font_size = self.font_size.clamp(8, 48);
        self.tab_size = self.tab_size.clamp(1, 8);
        self
    }
}

/// Reads and writes [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// A store backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings, falling back to the defaults.
    pub fn load(&self) -> Settings {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Settings::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read settings, using defaults");
                return Settings::default();
            }
        };
        match serde_json::from_str::<Settings>(&text) {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "invalid settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Persist `settings`, creating parent directories as needed.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Load, modify and save in one step. Returns the saved settings.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<Settings, SettingsError> {
        let mut settings = self.load();
        f(&mut settings);
        let settings = settings.normalized();
        self.save(&settings)?;
        Ok(settings)
    }
}
