//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.embed_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.embed_size must be > 0".into(),
            ));
        }
        if self.model.hidden_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.hidden_size must be > 0".into(),
            ));
        }
        if self.model.num_layers == 0 {
            return Err(ConfigError::ValidationError(
                "model.num_layers must be > 0".into(),
            ));
        }
        if self.model.max_caption_len == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_caption_len must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_upload_mb must be > 0".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}
