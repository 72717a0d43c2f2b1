//! Exam-Restore Core Library
//!
//! This library provides the core functionality for the exam-restore tool:
//! region selection over an uploaded photo, image encoding, and restoration
//! through Google's Gemini image models.
//!
//! # Overview
//!
//! A user uploads a photo of a completed exam paper, optionally drags a
//! rectangle over the part they care about, and asks for it to be restored.
//! The model removes handwriting, whitens the background and darkens the
//! printed text. The library handles:
//!
//! - **Selection**: drag-gesture geometry via [`selection`]
//! - **Encoding**: data-URL payloads and region extraction via [`encoding`]
//! - **Restoration**: the request/response adapter via [`restore`] and [`gemini`]
//! - **Workflow**: the upload → crop → restoring → result state machine via [`workflow`]
//!
//! # Quick Start
//!
//! ```ignore
//! use exam_restore_core::{ExamRestore, Point};
//!
//! let app = ExamRestore::new(None)?;
//! let mut session = exam_restore_core::Session::new();
//!
//! session.upload_file("page.jpg")?;
//! session.begin_selection(Point::new(10.0, 10.0));
//! session.update_selection(Point::new(400.0, 300.0));
//! session.end_selection();
//!
//! app.restore(&mut session).await?;
//! if let Some(err) = session.error() {
//!     eprintln!("{}", err);
//! }
//! ```
//!
//! # Module Structure
//!
//! - [`config`]: Configuration loading and management
//! - [`encoding`]: Data URLs, file encoding and region extraction
//! - [`error`]: Error types and result aliases
//! - [`gemini`]: Gemini-backed image editor
//! - [`restore`]: Restoration client and response model
//! - [`selection`]: Drag-selection geometry
//! - [`settings`]: Persisted user preferences
//! - [`workflow`]: Session state machine

pub mod config;
pub mod encoding;
pub mod error;
pub mod gemini;
pub mod restore;
pub mod selection;
pub mod settings;
pub mod workflow;

use std::path::PathBuf;

// Re-export primary types for convenience
pub use config::Config;
pub use encoding::{DisplaySize, EncodedImage};
pub use error::{AppError, Result};
pub use gemini::GeminiEditor;
pub use restore::{ImageEditor, RestorationClient};
pub use selection::{Point, PointerSample, SelectionRect};
pub use settings::Settings;
pub use workflow::{Session, Step};

/// Main entry point for the exam-restore application.
///
/// Owns the configuration, the saved settings it was layered from, and a
/// Gemini-backed restoration client, and drives [`Session`]s through the
/// restoration step.
pub struct ExamRestore {
    config: Config,
    settings: Settings,
    client: RestorationClient<GeminiEditor>,
}

impl ExamRestore {
    /// Creates an instance from the environment, then saved settings, then
    /// `model`, each layer overriding the one before.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured model name is invalid or the
    /// Gemini client cannot be built.
    pub fn new(model: Option<String>) -> Result<Self> {
        Self::with_settings(Config::load()?, Settings::load(), model)
    }

    /// Creates an instance with custom configuration and no saved settings.
    ///
    /// Use this when you need to override environment-based configuration,
    /// such as specifying a different model or API key.
    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_settings(config, Settings::default(), None)
    }

    /// Layers `settings` and then `model` over `config`.
    pub fn with_settings(
        mut config: Config,
        settings: Settings,
        model: Option<String>,
    ) -> Result<Self> {
        settings.apply_to(&mut config);
        if let Some(model) = model {
            config = Config::builder()
                .with_api_key(config.gemini_api_key)
                .with_model(model)
                .build()?;
        }

        let client = RestorationClient::new(GeminiEditor::new(&config)?);
        Ok(Self { config, settings, client })
    }

    /// Runs the restoration step for a session that is in [`Step::Crop`].
    ///
    /// Failures from the service are recorded on the session; `Err` is only
    /// returned when the session is not ready to restore.
    pub async fn restore(&self, session: &mut Session) -> Result<Step> {
        session.restore(&self.client).await
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Records the model in use and `output_dir` as the preferences for next
    /// time. Call [`Settings::save`] on the result to persist them.
    pub fn remember(&mut self, output_dir: PathBuf) -> &Settings {
        self.settings.model = self.config.model_name.clone();
        self.settings.output_dir = Some(output_dir);
        &self.settings
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before using any other functions.
/// This loads `.env` files if present.
pub fn init() {
    let _ = dotenvy::dotenv();
}
