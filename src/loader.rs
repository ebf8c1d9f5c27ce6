//! JSON and YAML document loading.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, BuildError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            _ => Err(BuildError::UnsupportedInputType {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

/// Load a document into `T`.
///
/// A missing file is [`BuildError::ConfigNotFound`], a document that does not
/// parse into `T` is [`BuildError::ConfigSchema`].
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Err(BuildError::ConfigNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let format = Format::from_path(path)?;

    tracing::debug!("Loading {}", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let parsed = match format {
        Format::Json => serde_json::from_str(&text).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| {
        BuildError::ConfigSchema {
            path: path.to_path_buf(),
            message,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        version: String,
        #[serde(default)]
        urls: Vec<String>,
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let temp = TempDir::new().unwrap();
        let json = temp.path().join("a.json");
        let yaml = temp.path().join("a.YML");
        fs::write(&json, r#"{"version": "1.36.1", "urls": ["https://a"]}"#).unwrap();
        fs::write(&yaml, "version: \"1.36.1\"\nurls:\n  - https://a\n").unwrap();

        let a: Sample = load(&json).unwrap();
        let b: Sample = load(&yaml).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let err = load::<serde_json::Value>(Path::new("/nonexistent/layout.yaml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("layout.toml");
        fs::write(&path, "x = 1").unwrap();

        match load::<serde_json::Value>(&path).unwrap_err().downcast_ref::<BuildError>() {
            Some(BuildError::UnsupportedInputType { extension, .. }) => assert_eq!(extension, "toml"),
            other => panic!("expected UnsupportedInputType, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_shape_is_schema_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("busybox.json");
        fs::write(&path, r#"{"urls": []}"#).unwrap();

        let err = load::<Sample>(&path).unwrap_err();
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::ConfigSchema { message, .. }) => assert!(message.contains("version")),
            other => panic!("expected ConfigSchema, got {:?}", other),
        }
    }
}
