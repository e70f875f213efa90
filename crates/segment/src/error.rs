use std::path::PathBuf;

use mask::MaskError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use visualize::VisualizeError;

use crate::model::AdapterError;

/// Failure class of an error, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FaultKind {
    /// Bad input from the caller: limits, malformed images or prompts
    Validation,
    /// Contour tracing or simplification failed
    Conversion,
    /// Visualization could not be drawn or encoded
    Compositing,
    /// The model adapter failed
    Adapter,
    /// Settings or replay data could not be loaded
    Configuration,
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Image size {size_mb:.2}MB exceeds limit of {limit_mb}MB")]
    ImageTooLarge { size_mb: f64, limit_mb: f64 },

    #[error("Image {width}x{height} exceeds max dimension {limit}")]
    DimensionExceeded { width: u32, height: u32, limit: u32 },

    #[error("Batch size {size} exceeds max {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Number of images ({images}) must match number of prompts ({prompts})")]
    BatchLengthMismatch { images: usize, prompts: usize },

    #[error("Batch contains no images")]
    EmptyBatch,

    #[error("Malformed prompt: {0}")]
    MalformedPrompt(String),

    #[error("Failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    #[error("Invalid {name}: {value} is outside [0, 1]")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Geometry conversion failed: {0}")]
    Conversion(#[from] MaskError),

    #[error("Visualization failed: {0}")]
    Compositing(#[from] VisualizeError),

    #[error("Model adapter failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Failed to load replay data from {path:?}: {reason}")]
    Replay { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SegmentError {
    pub fn kind(&self) -> FaultKind {
        match self {
            SegmentError::ImageTooLarge { .. }
            | SegmentError::DimensionExceeded { .. }
            | SegmentError::BatchTooLarge { .. }
            | SegmentError::BatchLengthMismatch { .. }
            | SegmentError::EmptyBatch
            | SegmentError::MalformedPrompt(_)
            | SegmentError::ImageDecode(_)
            | SegmentError::InvalidThreshold { .. } => FaultKind::Validation,
            SegmentError::Conversion(_) => FaultKind::Conversion,
            SegmentError::Compositing(_) => FaultKind::Compositing,
            SegmentError::Adapter(_) => FaultKind::Adapter,
            SegmentError::Settings(_)
            | SegmentError::Replay { .. }
            | SegmentError::Io(_)
            | SegmentError::Toml(_)
            | SegmentError::Json(_) => FaultKind::Configuration,
        }
    }

    /// Whether the caller can fix this by changing the request
    pub fn is_client_fault(&self) -> bool {
        self.kind() == FaultKind::Validation
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor::from(self)
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;

/// Serializable summary of a failure attached to a batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDescriptor {
    pub kind: FaultKind,
    pub message: String,
}

impl From<&SegmentError> for ErrorDescriptor {
    fn from(err: &SegmentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
