//! User settings persistence.
//!
//! Preferences (model, output directory, API key override) survive between
//! runs. Images never do: sessions live only in memory.

use crate::config::Config;
use crate::error::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// User-configurable settings persisted between runs.
///
/// Settings are stored as JSON in the user's config directory
/// (e.g., `~/.config/exam-restore/settings.json` on Linux).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Preferred model name. Empty means "use the configured default".
    #[serde(default)]
    pub model: String,
    /// Directory restored images are written to.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// API key override (takes precedence over environment).
    #[serde(default)]
    pub api_key: String,
}

impl Settings {
    /// Returns the path to the settings file.
    ///
    /// Creates the config directory if it doesn't exist.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "exam-restore", "exam-restore").map(|dirs| {
            let config_dir = dirs.config_dir();
            if !config_dir.exists() {
                let _ = fs::create_dir_all(config_dir);
            }
            config_dir.join("settings.json")
        })
    }

    /// Loads settings from the user's config directory, falling back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads settings from an explicit file, falling back to defaults if it is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| {
                debug!(path = %path.display(), "no usable settings file, using defaults");
                Self::default()
            })
    }

    /// Persists settings to the user's config directory.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    /// Persists settings to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Overlays non-empty settings onto a loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if !self.model.trim().is_empty() {
            config.model_name = self.model.clone();
        }
        if !self.api_key.trim().is_empty() {
            config.gemini_api_key = self.api_key.clone();
        }
    }
}
