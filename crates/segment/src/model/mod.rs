pub mod replay;

use std::sync::Arc;

use image::RgbImage;
use mask::RasterMask;
use thiserror::Error;

use crate::prompt::PromptSpec;

pub use replay::ReplayModel;

/// Score and mask cut-offs handed to the model adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Objects scoring at or below this are not returned
    pub detection: f64,
    /// Mask probabilities above this are foreground
    pub mask: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            detection: 0.5,
            mask: 0.5,
        }
    }
}

/// One accepted object as returned by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPrediction {
    /// (x1, y1, x2, y2) in original-image pixels
    pub bbox: [f64; 4],
    pub score: f64,
    /// Binary mask sized to the original image
    pub mask: RasterMask,
}

/// Failure reported by a model adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AdapterError {
    message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Per-image outcome inside a batched model call
pub type ImagePredictions = std::result::Result<Vec<ObjectPrediction>, AdapterError>;

/// Boundary to the external segmentation runtime.
///
/// Implementations apply both thresholds themselves; every returned object is
/// kept by the caller in the order given.
pub trait SegmentationModel: Send + Sync {
    fn predict(
        &self,
        image: &RgbImage,
        prompt: &PromptSpec,
        thresholds: Thresholds,
    ) -> std::result::Result<Vec<ObjectPrediction>, AdapterError>;

    /// One call for many images. `prompts[i]` belongs to `images[i]`; `None`
    /// means the model's default prompt. The outer error fails the whole call,
    /// inner errors fail a single image.
    fn predict_batch(
        &self,
        images: &[&RgbImage],
        prompts: &[Option<String>],
        thresholds: Thresholds,
    ) -> std::result::Result<Vec<ImagePredictions>, AdapterError>;
}

impl<T: SegmentationModel + ?Sized> SegmentationModel for Arc<T> {
    fn predict(
        &self,
        image: &RgbImage,
        prompt: &PromptSpec,
        thresholds: Thresholds,
    ) -> std::result::Result<Vec<ObjectPrediction>, AdapterError> {
        (**self).predict(image, prompt, thresholds)
    }

    fn predict_batch(
        &self,
        images: &[&RgbImage],
        prompts: &[Option<String>],
        thresholds: Thresholds,
    ) -> std::result::Result<Vec<ImagePredictions>, AdapterError> {
        (**self).predict_batch(images, prompts, thresholds)
    }
}
