//! Pipeline configuration, loaded from JSON and overridden from the command line.

use crate::errors::AppError;
use densify_core::TemporalMaskConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub enable_tracy: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_tracy: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Texture holding each frame's motion from its previous frame.
    pub forward_flow: String,
    /// Texture holding each frame's motion from its next frame.
    pub backward_flow: String,
    pub mask: TemporalMaskConfig,
    /// Worker threads for batch processing; 0 keeps rayon's default.
    pub threads: usize,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forward_flow: "PointsSparseOpticalFlowForward".to_string(),
            backward_flow: "PointsSparseOpticalFlowBackward".to_string(),
            mask: TemporalMaskConfig::default(),
            threads: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The file at `path`, or the defaults when there is none.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => Self::from_json(&std::fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{ "forward_flow": "Flow", "mask": { "occlusion": { "artifact_filter_size": 0 } } }"#,
        )
        .unwrap();

        assert_eq!(config.forward_flow, "Flow");
        assert_eq!(config.backward_flow, "PointsSparseOpticalFlowBackward");
        assert_eq!(config.mask.occlusion.artifact_filter_size, 0);
        assert_eq!(config.mask.occlusion.distance, 1.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file() {
        assert_eq!(PipelineConfig::load(None).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PipelineConfig::from_json("{ threads: }"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "threads": 3, "logging": { "level": "debug" } }"#).unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.enable_tracy);
    }
}
