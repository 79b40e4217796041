//! Codec configuration.
//!
//! Stored in `<config dir>/stegcodec/config.toml`. Every field has a default,
//! so a missing file or a partial file is valid.
//!
//! Embedding and extraction must agree on these values: the embedding plan is
//! recomputed from the carrier plus this configuration and is never stored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of LSB copies per payload bit.
pub const DEFAULT_REDUNDANCY: usize = 3;

/// Default sample stride between consecutive LSB sites.
pub const DEFAULT_SPACING: usize = 1;

/// Default retention for staged video frames.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Default cap on frames decoded into the staging cache for one video.
pub const DEFAULT_MAX_STAGED_FRAMES: usize = 5_000;

/// Errors that can occur when loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found. Unable to determine home directory.")]
    NoConfigDir,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Wavelet embedding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Decomposition depth.
    pub levels: usize,
    /// Detail bands to fill, in order (1 = finest).
    pub bands: Vec<usize>,
    /// Coefficient stride inside a band.
    pub spacing: usize,
    /// Coefficients skipped at the start of each band.
    pub edge_skip: usize,
    /// Fraction of the signal left untouched at each end.
    pub edge_fraction: f64,
    /// Minimum magnitude forced onto an embedded coefficient.
    pub magnitude_floor: f64,
    /// Coefficients at or below this value read as bit 0.
    pub epsilon: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            levels: 4,
            bands: vec![3, 2],
            spacing: 2,
            edge_skip: 8,
            edge_fraction: 0.10,
            magnitude_floor: 48.0,
            epsilon: 1.0,
        }
    }
}

/// Video staging cache parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Root directory; defaults to `<cache dir>/stegcodec/staging`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub retention_days: u32,
    pub max_staged_frames: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            max_staged_frames: DEFAULT_MAX_STAGED_FRAMES,
        }
    }
}

impl StagingConfig {
    /// The configured root, or the platform cache directory.
    pub fn resolve_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|d| d.join("stegcodec").join("staging"))
            .ok_or(ConfigError::NoConfigDir)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub redundancy: usize,
    pub spacing: usize,
    pub transform: TransformConfig,
    pub staging: StagingConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            redundancy: DEFAULT_REDUNDANCY,
            spacing: DEFAULT_SPACING,
            transform: TransformConfig::default(),
            staging: StagingConfig::default(),
        }
    }
}

impl CodecConfig {
    /// Loads the configuration from the default location.
    ///
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: CodecConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join("stegcodec").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Rejects values that would make the embedding plan degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redundancy == 0 {
            return Err(ConfigError::Invalid("redundancy must be at least 1".into()));
        }
        if self.spacing == 0 {
            return Err(ConfigError::Invalid("spacing must be at least 1".into()));
        }
        let t = &self.transform;
        if t.levels == 0 || t.levels > 12 {
            return Err(ConfigError::Invalid(format!(
                "transform.levels must be in 1..=12, got {}",
                t.levels
            )));
        }
        if t.bands.is_empty() {
            return Err(ConfigError::Invalid("transform.bands is empty".into()));
        }
        if let Some(&band) = t.bands.iter().find(|&&b| b == 0 || b > t.levels) {
            return Err(ConfigError::Invalid(format!(
                "transform band {band} outside 1..={}",
                t.levels
            )));
        }
        if t.spacing == 0 {
            return Err(ConfigError::Invalid("transform.spacing must be at least 1".into()));
        }
        if !(0.0..0.5).contains(&t.edge_fraction) {
            return Err(ConfigError::Invalid(
                "transform.edge_fraction must be in [0, 0.5)".into(),
            ));
        }
        if t.magnitude_floor <= t.epsilon {
            return Err(ConfigError::Invalid(
                "transform.magnitude_floor must exceed transform.epsilon".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        CodecConfig::default().validate().unwrap();
    }

    #[test]
    fn test_toml_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = CodecConfig::default();
        config.redundancy = 5;
        config.staging.dir = Some(temp_dir.path().join("staging"));
        config.save_to(&path).unwrap();

        let loaded = CodecConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: CodecConfig = toml::from_str("redundancy = 4\n[transform]\nlevels = 5\n").unwrap();
        assert_eq!(config.redundancy, 4);
        assert_eq!(config.spacing, DEFAULT_SPACING);
        assert_eq!(config.transform.levels, 5);
        assert_eq!(config.transform.bands, vec![3, 2]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CodecConfig::default();
        config.redundancy = 0;
        assert!(config.validate().is_err());

        let mut config = CodecConfig::default();
        config.transform.bands = vec![7];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CodecConfig::default();
        config.transform.edge_fraction = 0.6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_rejected_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "spacing = 0\n").unwrap();
        assert!(matches!(
            CodecConfig::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
