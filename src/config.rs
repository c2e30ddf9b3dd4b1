use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for chromatic-gif
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame scheduling and pixel algorithm settings
    pub processing: ProcessingConfig,

    /// Remote AI edit service settings
    pub remote: RemoteConfig,

    /// GIF decoding limits
    pub decoding: DecodingConfig,

    /// GIF encoding settings
    pub encoding: EncodingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.processing.validate()?;
        self.remote.validate()?;
        self.decoding.validate()?;
        self.encoding.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Frame scheduling and pixel algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Concurrent frame workers per project run
    pub worker_count: usize,

    /// Per-index delay before a remote call (ms)
    pub stagger_ms: u64,

    /// Maximum RGB distance for a recolor rule to match
    pub recolor_threshold: f32,

    /// Pixels with alpha below this are never recolored
    pub alpha_skip_threshold: u8,

    /// Width of the feather band past the removal tolerance
    pub feather_band: f32,

    /// Key color tolerance used when none is given
    pub default_tolerance: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            stagger_ms: 200,
            recolor_threshold: 60.0,
            alpha_skip_threshold: 10,
            feather_band: 20.0,
            default_tolerance: 60.0,
        }
    }
}

impl ProcessingConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(invalid("processing.worker_count", self.worker_count).into());
        }

        if self.recolor_threshold <= 0.0 {
            return Err(invalid("processing.recolor_threshold", self.recolor_threshold).into());
        }

        if self.feather_band <= 0.0 {
            return Err(invalid("processing.feather_band", self.feather_band).into());
        }

        if self.default_tolerance < 0.0 {
            return Err(invalid("processing.default_tolerance", self.default_tolerance).into());
        }

        Ok(())
    }
}

/// Remote AI edit service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Whether runs use the remote service by default
    pub enabled: bool,

    /// Base URL of the generative language API
    pub endpoint: String,

    /// Image editing model name
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Retries after the first quota-limited attempt
    pub max_retries: u32,

    /// Base backoff delay (ms), doubled per attempt
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff (ms)
    pub max_jitter_ms: u64,

    /// Optional per-request timeout; unbounded when absent
    pub request_timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            max_retries: 3,
            base_delay_ms: 2000,
            max_jitter_ms: 1000,
            request_timeout_secs: None,
        }
    }
}

impl RemoteConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.endpoint.trim().is_empty() {
            return Err(invalid("remote.endpoint", &self.endpoint).into());
        }

        if self.enabled && self.model.trim().is_empty() {
            return Err(invalid("remote.model", &self.model).into());
        }

        if self.request_timeout_secs == Some(0) {
            return Err(invalid("remote.request_timeout_secs", 0).into());
        }

        Ok(())
    }
}

/// GIF decoding limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingConfig {
    /// Frames beyond this are strided away
    pub max_frames: usize,

    /// Wider frames are downscaled to this width
    pub max_width: u32,

    /// Delay for frames whose source delay is zero (ms)
    pub default_delay_ms: u32,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            max_frames: 50,
            max_width: 300,
            default_delay_ms: crate::frames::DEFAULT_DELAY_MS,
        }
    }
}

impl DecodingConfig {
    fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            return Err(invalid("decoding.max_frames", self.max_frames).into());
        }

        if self.max_width == 0 {
            return Err(invalid("decoding.max_width", self.max_width).into());
        }

        if self.default_delay_ms == 0 {
            return Err(invalid("decoding.default_delay_ms", self.default_delay_ms).into());
        }

        Ok(())
    }
}

/// GIF encoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// NeuQuant sampling speed, 1 (best) to 30 (fastest)
    pub quality: u8,

    /// Loop the animation forever
    pub repeat_forever: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            quality: 10,
            repeat_forever: true,
        }
    }
}

impl EncodingConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=30).contains(&self.quality) {
            return Err(invalid("encoding.quality", self.quality).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.processing.worker_count = 4;
        original_config.remote.request_timeout_secs = Some(30);

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.processing.worker_count, 4);
        assert_eq!(loaded_config.remote.request_timeout_secs, Some(30));
        assert_eq!(loaded_config.decoding.max_frames, original_config.decoding.max_frames);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[processing]\nworker_count = 3\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.processing.worker_count, 3);
        assert_eq!(config.processing.stagger_ms, 200);
        assert_eq!(config.remote.max_retries, 3);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::error::EditorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.processing.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_quality() {
        let mut config = Config::default();
        config.encoding.quality = 31;
        assert!(config.validate().is_err());
    }
}
