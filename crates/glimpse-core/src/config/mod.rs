//! Configuration management for Glimpse.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. All config structs implement `Default`, and the model section
//! defaults match the architecture the shipped parameters were trained with.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Glimpse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Model artifact names and architecture
    pub model: ModelConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.glimpse.glimpse/config.toml
    /// - Linux: ~/.config/glimpse/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\glimpse\config\config.toml
    ///
    /// Falls back to ~/.glimpse/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "glimpse", "glimpse")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".glimpse").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Resolve the on-disk locations of the three model artifacts.
    pub fn artifact_paths(&self) -> ArtifactPaths {
        let dir = self.model_dir();
        ArtifactPaths {
            vocabulary: dir.join(&self.model.vocabulary_file),
            encoder_backbone: dir.join(&self.model.encoder_backbone_file),
            encoder_head: dir.join(&self.model.encoder_head_file),
            decoder: dir.join(&self.model.decoder_file),
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Resolved file paths for everything the captioner loads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub vocabulary: PathBuf,
    pub encoder_backbone: PathBuf,
    pub encoder_head: PathBuf,
    pub decoder: PathBuf,
}

impl ArtifactPaths {
    /// Each artifact paired with a short label, in load order.
    pub fn labelled(&self) -> [(&'static str, &Path); 4] {
        [
            ("vocabulary", self.vocabulary.as_path()),
            ("encoder backbone", self.encoder_backbone.as_path()),
            ("encoder head", self.encoder_head.as_path()),
            ("decoder", self.decoder.as_path()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.embed_size, 256);
        assert_eq!(config.model.hidden_size, 512);
        assert_eq!(config.model.num_layers, 2);
        assert_eq!(config.model.max_caption_len, 20);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[model]"));
        assert!(toml.contains("[server]"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.embed_size, 256);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model]\nmax_caption_len = 0\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_caption_len"));
    }

    #[test]
    fn test_artifact_paths_join_model_dir() {
        let mut config = Config::default();
        config.general.model_dir = PathBuf::from("/srv/models");
        let paths = config.artifact_paths();
        assert_eq!(paths.vocabulary, PathBuf::from("/srv/models/vocab.json"));
        assert_eq!(
            paths.encoder_backbone,
            PathBuf::from("/srv/models/encoder_backbone.onnx")
        );
        assert_eq!(
            paths.decoder,
            PathBuf::from("/srv/models/decoder.safetensors")
        );
    }
}
