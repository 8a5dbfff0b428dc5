//! Sub-configuration structs with defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where model artifacts are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.glimpse/models"),
        }
    }
}

/// Model artifact names and the architecture they must agree on.
///
/// The dimensions here are checked against every loaded tensor; a mismatch
/// is a startup failure, never a per-request one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Vocabulary JSON, relative to `general.model_dir`
    pub vocabulary_file: String,

    /// ONNX export of the convolutional backbone
    pub encoder_backbone_file: String,

    /// Safetensors file holding the encoder's projection head
    pub encoder_head_file: String,

    /// Safetensors file holding the decoder parameters
    pub decoder_file: String,

    /// Width of image and token embeddings
    pub embed_size: usize,

    /// LSTM hidden width
    pub hidden_size: usize,

    /// Number of stacked LSTM layers
    pub num_layers: usize,

    /// Maximum number of decode steps per caption
    pub max_caption_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocabulary_file: "vocab.json".to_string(),
            encoder_backbone_file: "encoder_backbone.onnx".to_string(),
            encoder_head_file: "encoder_head.safetensors".to_string(),
            decoder_file: "decoder.safetensors".to_string(),
            embed_size: 256,
            hidden_size: 512,
            num_layers: 2,
            max_caption_len: 20,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 20,
            max_image_dimension: 10000,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in megabytes
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_mb: 25,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
