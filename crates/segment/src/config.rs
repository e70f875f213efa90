use std::path::{Path, PathBuf};

use mask::{GeometryConverter, DEFAULT_TOLERANCE};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visualize::{OutputFormat, VisualizationConfig};

use crate::{
    error::{Result, SegmentError},
    model::Thresholds,
};

/// Prefix of environment variables that override settings
pub const ENV_PREFIX: &str = "SEGMENT_";

/// Geometry conversion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConverterSettings {
    /// Douglas-Peucker tolerance in pixels
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ConverterSettings {
    pub fn build(&self) -> Result<GeometryConverter> {
        Ok(GeometryConverter::builder().with_tolerance(self.tolerance).build()?)
    }
}

/// Thresholds, request limits and visualization defaults.
///
/// Passed by value into the orchestrator; nothing is read from process state
/// unless [`Settings::with_env_overrides`] is called explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Default detection threshold
    pub threshold: f64,
    /// Default mask binarization threshold
    pub mask_threshold: f64,
    /// Largest accepted encoded image, in megabytes
    pub max_image_size_mb: f64,
    /// Largest accepted width or height, in pixels
    pub max_image_dimension: u32,
    pub max_batch_size: usize,
    pub converter: ConverterSettings,
    pub visualization: VisualizationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            mask_threshold: 0.5,
            max_image_size_mb: 10.0,
            max_image_dimension: 4096,
            max_batch_size: 10,
            converter: ConverterSettings::default(),
            visualization: VisualizationConfig::default(),
        }
    }
}

impl Settings {
    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(SegmentError::Settings(format!(
                "unsupported settings file {}: expected .toml or .json",
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `SEGMENT_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `SEGMENT_*` key/value pairs; other keys are ignored
    pub fn apply_overrides<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "THRESHOLD" => self.threshold = parse(name, value)?,
                "MASK_THRESHOLD" => self.mask_threshold = parse(name, value)?,
                "MAX_IMAGE_SIZE_MB" => self.max_image_size_mb = parse(name, value)?,
                "MAX_IMAGE_DIMENSION" => self.max_image_dimension = parse(name, value)?,
                "MAX_BATCH_SIZE" => self.max_batch_size = parse(name, value)?,
                "SIMPLIFY_TOLERANCE" => self.converter.tolerance = parse(name, value)?,
                "VISUALIZATION_FORMAT" => self.visualization.format = parse::<OutputFormat>(name, value)?,
                "VISUALIZATION_QUALITY" => self.visualization.quality = parse(name, value)?,
                "VISUALIZATION_ALPHA" => self.visualization.alpha = parse(name, value)?,
                "FONT_PATH" => self.visualization.font_path = Some(PathBuf::from(value)),
                _ => {
                    debug!(key = key.as_ref(), "Ignoring unknown settings override");
                    continue;
                }
            }
            debug!(key = key.as_ref(), value, "Applied settings override");
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("threshold", self.threshold), ("mask_threshold", self.mask_threshold)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SegmentError::Settings(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.max_image_size_mb.is_nan() || self.max_image_size_mb <= 0.0 {
            return Err(SegmentError::Settings(format!(
                "max_image_size_mb must be positive, got {}",
                self.max_image_size_mb
            )));
        }
        if self.max_image_dimension == 0 {
            return Err(SegmentError::Settings("max_image_dimension must be positive".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(SegmentError::Settings("max_batch_size must be positive".to_string()));
        }
        let tolerance = self.converter.tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(SegmentError::Settings(format!("tolerance must be non-negative, got {tolerance}")));
        }
        self.visualization
            .validate()
            .map_err(|e| SegmentError::Settings(e.to_string()))
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            detection: self.threshold,
            mask: self.mask_threshold,
        }
    }

    /// Payload ceiling in bytes
    pub fn max_image_bytes(&self) -> f64 {
        self.max_image_size_mb * 1024.0 * 1024.0
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| SegmentError::Settings(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.threshold, 0.5);
        assert_eq!(settings.mask_threshold, 0.5);
        assert_eq!(settings.max_image_size_mb, 10.0);
        assert_eq!(settings.max_image_dimension, 4096);
        assert_eq!(settings.max_batch_size, 10);
        assert_eq!(settings.converter.tolerance, 1.5);
        assert_eq!(settings.visualization.format, OutputFormat::Png);
        assert_eq!(settings.visualization.quality, 95);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            max_batch_size = 4

            [visualization]
            format = "JPEG"
            quality = 80
            "#,
        )
        .unwrap();
        assert_eq!(settings.max_batch_size, 4);
        assert_eq!(settings.visualization.format, OutputFormat::Jpeg);
        assert_eq!(settings.visualization.quality, 80);
        assert_eq!(settings.visualization.alpha, 0.5);
        assert_eq!(settings.max_image_dimension, 4096);
    }

    #[test]
    fn test_json_settings() {
        let settings = Settings::from_json_str(r#"{"threshold": 0.3, "converter": {"tolerance": 2.5}}"#).unwrap();
        assert_eq!(settings.threshold, 0.3);
        assert_eq!(settings.converter.tolerance, 2.5);
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("settings.toml");
        std::fs::write(&toml_path, "max_image_dimension = 512\n").unwrap();
        assert_eq!(Settings::from_file(&toml_path).unwrap().max_image_dimension, 512);

        let yaml_path = dir.path().join("settings.yaml");
        std::fs::write(&yaml_path, "max_image_dimension: 512\n").unwrap();
        assert!(matches!(Settings::from_file(&yaml_path), Err(SegmentError::Settings(_))));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::default()
            .apply_overrides([
                ("SEGMENT_MAX_IMAGE_DIMENSION", "1024"),
                ("SEGMENT_VISUALIZATION_FORMAT", "jpeg"),
                ("SEGMENT_SIMPLIFY_TOLERANCE", "3"),
                ("HOME", "/root"),
            ])
            .unwrap();
        assert_eq!(settings.max_image_dimension, 1024);
        assert_eq!(settings.visualization.format, OutputFormat::Jpeg);
        assert_eq!(settings.converter.tolerance, 3.0);

        assert!(Settings::default()
            .apply_overrides([("SEGMENT_MAX_BATCH_SIZE", "many")])
            .is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let cases = [
            Settings {
                threshold: 1.2,
                ..Default::default()
            },
            Settings {
                max_batch_size: 0,
                ..Default::default()
            },
            Settings {
                converter: ConverterSettings { tolerance: -1.0 },
                ..Default::default()
            },
            Settings {
                visualization: VisualizationConfig {
                    quality: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for settings in cases {
            assert!(settings.validate().is_err(), "{settings:?}");
        }
    }
}
