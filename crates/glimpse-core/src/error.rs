//! Error types for the Glimpse captioning pipeline.
//!
//! Errors are split by lifetime: [`ModelError`] happens while loading
//! artifacts at startup and is fatal, [`CaptionError`] belongs to a single
//! request and never affects other requests.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Glimpse operations.
#[derive(Error, Debug)]
pub enum GlimpseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Missing or inconsistent model artifacts
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Per-request captioning errors
    #[error("Caption error: {0}")]
    Caption(#[from] CaptionError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Startup errors: artifacts that are missing, unreadable, or disagree on shape.
///
/// Any of these means the process must not serve traffic.
#[derive(Error, Debug)]
pub enum ModelError {
    /// An artifact file does not exist
    #[error("Model artifact not found: {path}. {hint}")]
    MissingArtifact { path: PathBuf, hint: String },

    /// An artifact exists but could not be read or parsed
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// A required tensor is absent from a parameter file
    #[error("Tensor `{name}` missing from {path}")]
    MissingTensor { path: PathBuf, name: String },

    /// A tensor's shape disagrees with the configured architecture
    #[error("Shape mismatch for `{name}`: expected {expected:?}, found {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The vocabulary file violates the reserved-token layout
    #[error("Invalid vocabulary: {0}")]
    Vocabulary(String),
}

/// Per-request captioning errors, organized by stage.
#[derive(Error, Debug)]
pub enum CaptionError {
    /// Input bytes could not be decoded as an image
    #[error("Cannot decode image: {message}")]
    ImageDecode { message: String },

    /// Upload exceeds the configured size limit
    #[error("File too large: {size_mb}MB > {max_mb}MB")]
    FileTooLarge { size_mb: u64, max_mb: u64 },

    /// Image dimensions exceed the configured limit
    #[error("Image too large: {width}x{height} > {max_dim}")]
    ImageTooLarge { width: u32, height: u32, max_dim: u32 },

    /// Failure inside preprocessing, encoding, or decoding
    #[error("Inference failed in {stage} stage: {message}")]
    Inference { stage: String, message: String },

    /// A token id outside the vocabulary range
    #[error("Token id {id} is outside the vocabulary (size {vocab_size})")]
    UnknownToken { id: u32, vocab_size: usize },
}

impl CaptionError {
    pub(crate) fn inference(stage: &str, message: impl Into<String>) -> Self {
        Self::Inference {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Glimpse results.
pub type Result<T> = std::result::Result<T, GlimpseError>;

/// Convenience type alias for per-request results.
pub type CaptionResult<T> = std::result::Result<T, CaptionError>;

/// Convenience type alias for startup/loading results.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
