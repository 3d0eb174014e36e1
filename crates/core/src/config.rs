use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::infrastructure::onnx_yolo_detector::DEFAULT_CONFIDENCE;
use crate::expression::infrastructure::cascade_file_provider::CascadeFileProvider;
use crate::shared::constants::APP_DIR_NAME;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("confidence must be within 0.0-1.0, got {0}")]
    Confidence(f64),
}

/// Service settings, read from `<config_dir>/FaceMood/config.json`.
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Minimum face detector score (0.0-1.0).
    pub confidence: f64,
    /// Directory holding pre-packaged ONNX models, checked after the cache.
    pub models_dir: Option<PathBuf>,
    /// Whether located faces also get an embedding.
    pub compute_encodings: bool,
    /// Explicit smile cascade file; takes precedence over every search path.
    pub smile_cascade: Option<PathBuf>,
    /// Extra directories searched for `haarcascade_smile.xml`.
    pub cascade_dirs: Vec<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            models_dir: None,
            compute_encodings: true,
            smile_cascade: None,
            cascade_dirs: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.json"))
    }

    /// Loads the user config, falling back to defaults when it is missing or
    /// unusable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path().filter(|p| p.is_file()) else {
            return Self::default();
        };
        match Self::from_file(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config: {e}");
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Confidence(self.confidence));
        }
        Ok(())
    }

    /// Smile cascade source honouring the configured path and directories.
    pub fn smile_source(&self) -> CascadeFileProvider {
        CascadeFileProvider::new(self.smile_cascade.clone(), self.cascade_dirs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(json: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, json).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.confidence, 0.5);
        assert!(config.compute_encodings);
        assert!(config.smile_cascade.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let (_tmp, path) = write_config(r#"{"confidence": 0.7}"#);
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.confidence, 0.7);
        assert!(config.compute_encodings);
        assert!(config.cascade_dirs.is_empty());
    }

    #[test]
    fn test_full_file() {
        let (_tmp, path) = write_config(
            r#"{
                "confidence": 0.3,
                "models_dir": "/opt/models",
                "compute_encodings": false,
                "smile_cascade": "/opt/smile.xml",
                "cascade_dirs": ["/a", "/b"]
            }"#,
        );
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.models_dir, Some(PathBuf::from("/opt/models")));
        assert!(!config.compute_encodings);
        assert_eq!(config.smile_cascade, Some(PathBuf::from("/opt/smile.xml")));
        assert_eq!(config.cascade_dirs.len(), 2);
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = ServiceConfig {
            confidence: 0.25,
            cascade_dirs: vec![PathBuf::from("/x")],
            ..ServiceConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<ServiceConfig>(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = ServiceConfig::from_file(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let (_tmp, path) = write_config("{ confidence: ");
        let err = ServiceConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_out_of_range_confidence() {
        let (_tmp, path) = write_config(r#"{"confidence": 1.5}"#);
        let err = ServiceConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Confidence(c) if c == 1.5));
    }

    #[test]
    fn test_config_path_under_app_dir() {
        if let Some(path) = ServiceConfig::config_path() {
            assert!(path.ends_with(Path::new(APP_DIR_NAME).join("config.json")));
        }
    }
}
