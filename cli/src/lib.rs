use schemars::JsonSchema;
use segment::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    SegmentError(#[from] segment::SegmentError),
    #[error("Manifest lists no images")]
    EmptyManifest,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One image of a batch manifest
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ManifestItem {
    pub path: PathBuf,
    /// Text prompt; the model's default when absent
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Batch request description, loaded from TOML or JSON
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchManifest {
    pub images: Vec<ManifestItem>,
}

impl BatchManifest {
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let manifest: BatchManifest = toml::from_str(content)?;
        manifest.check()
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let manifest: BatchManifest = serde_json::from_str(content)?;
        manifest.check()
    }

    /// Auto-detect file format and load the manifest. Relative image paths are
    /// resolved against the manifest's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let manifest = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            Some("json") => Self::from_json(&content)?,
            _ => return Err(CliError::UnsupportedFileFormat),
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(manifest.resolve_paths(base))
    }

    fn check(self) -> Result<Self, CliError> {
        if self.images.is_empty() {
            return Err(CliError::EmptyManifest);
        }
        Ok(self)
    }

    fn resolve_paths(mut self, base: &Path) -> Self {
        for item in &mut self.images {
            if item.path.is_relative() {
                item.path = base.join(&item.path);
            }
        }
        self
    }

    pub fn prompts(&self) -> Vec<Option<String>> {
        self.images.iter().map(|item| item.prompt.clone()).collect()
    }

    /// Read every image file, in manifest order
    pub fn read_images(&self) -> Result<Vec<Vec<u8>>, CliError> {
        self.images
            .iter()
            .map(|item| fs::read(&item.path).map_err(CliError::from))
            .collect()
    }
}

/// Settings from an optional file, then `SEGMENT_*` environment overrides
pub fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    let settings = match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    Ok(settings.with_env_overrides()?)
}
