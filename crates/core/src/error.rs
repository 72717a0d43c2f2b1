//! Error types for the exam-restore-core library.
//!
//! This module provides granular error variants for different failure modes,
//! enabling precise error handling and user-friendly error messages.

use thiserror::Error;

/// Errors that can occur within the exam-restore-core library.
///
/// Each variant represents a specific failure mode with contextual information
/// to help diagnose and handle errors appropriately.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing keys, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded file could not be read or decoded as an image.
    #[error("Failed to read image: {0}")]
    Read(String),

    /// A region could not be extracted from the source image.
    #[error("Failed to extract selected region: {0}")]
    Extraction(String),

    /// A data URL or base64 payload was malformed.
    #[error("Invalid encoded image: {0}")]
    Encoding(String),

    /// The model answered without any candidates.
    #[error("No response from AI model")]
    EmptyResponse,

    /// The model answered, but the first candidate carried no image.
    #[error("No image was returned by the model. It might have returned text instead.")]
    NoImagePart,

    /// Transport or API-level failure while talking to the image service.
    #[error("Image service error: {0}")]
    Service(String),

    /// The workflow rejected an action that is not valid in its current step.
    #[error("Cannot {action} while in the {from} step")]
    InvalidTransition {
        /// Step the session was in.
        from: &'static str,
        /// Action that was attempted.
        action: &'static str,
    },

    /// An outcome arrived for a restoration the session is no longer waiting on.
    #[error("Restoration result belongs to an earlier request")]
    StaleRestore,

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a read error with the given message.
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    /// Creates an extraction error with the given message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Creates an encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Creates an image service error with the given message.
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    /// Returns true when the service answered but produced no usable image.
    ///
    /// These outcomes are distinct from transport failures even though
    /// the workflow surfaces both the same way.
    pub fn is_unusable_response(&self) -> bool {
        matches!(self, Self::EmptyResponse | Self::NoImagePart)
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
