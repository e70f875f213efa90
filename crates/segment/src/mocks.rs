use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
};

use image::RgbImage;
use mask::RasterMask;

use crate::{
    model::{AdapterError, ImagePredictions, ObjectPrediction, SegmentationModel, Thresholds},
    prompt::PromptSpec,
};

/// Test double for the model adapter.
///
/// Each image yields `objects_per_image` square objects laid out along the
/// diagonal, with scores 0.9, 0.8, ... filtered by the detection threshold.
/// Images whose prompt is listed in `failing_prompts` fail individually;
/// `fail_whole_call` fails every call outright.
#[derive(Debug, Default)]
pub struct MockSegmentationModel {
    pub objects_per_image: usize,
    pub failing_prompts: HashSet<String>,
    pub fail_whole_call: bool,
    pub wrong_mask_size: bool,
    predict_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    batch_sizes: std::sync::Mutex<Vec<usize>>,
}

impl MockSegmentationModel {
    pub fn new(objects_per_image: usize) -> Self {
        Self {
            objects_per_image,
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, prompt: impl Into<String>) -> Self {
        self.failing_prompts.insert(prompt.into());
        self
    }

    pub fn failing_every_call(mut self) -> Self {
        self.fail_whole_call = true;
        self
    }

    /// Return masks one pixel wider than the image
    pub fn with_wrong_mask_size(mut self) -> Self {
        self.wrong_mask_size = true;
        self
    }

    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of images in each batched call so far
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().map(|sizes| sizes.clone()).unwrap_or_default()
    }

    fn objects_for(&self, image: &RgbImage, prompt: Option<&str>, thresholds: Thresholds) -> ImagePredictions {
        if let Some(prompt) = prompt {
            if self.failing_prompts.contains(prompt) {
                return Err(AdapterError::new(format!("mock failure for prompt {prompt:?}")));
            }
        }

        let (width, height) = image.dimensions();
        let mask_width = if self.wrong_mask_size { width + 1 } else { width };
        let side = (width.min(height) / (self.objects_per_image as u32 + 1)).max(1);

        Ok((0..self.objects_per_image)
            .map(|i| {
                let origin = i as u32 * side;
                let end = origin + side;
                let mask = RasterMask::from_fn(mask_width, height, |x, y| {
                    (origin..end).contains(&x) && (origin..end).contains(&y)
                });
                ObjectPrediction {
                    bbox: [origin as f64, origin as f64, (end - 1) as f64, (end - 1) as f64],
                    score: 0.9 - 0.1 * i as f64,
                    mask,
                }
            })
            .filter(|object| object.score > thresholds.detection)
            .collect())
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn predict(
        &self,
        image: &RgbImage,
        prompt: &PromptSpec,
        thresholds: Thresholds,
    ) -> Result<Vec<ObjectPrediction>, AdapterError> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_whole_call {
            return Err(AdapterError::new("mock model unavailable"));
        }
        let text = match prompt {
            PromptSpec::Text(text) => Some(text.as_str()),
            PromptSpec::Boxes(_) => None,
        };
        self.objects_for(image, text, thresholds)
    }

    fn predict_batch(
        &self,
        images: &[&RgbImage],
        prompts: &[Option<String>],
        thresholds: Thresholds,
    ) -> Result<Vec<ImagePredictions>, AdapterError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(images.len());
        }
        if self.fail_whole_call {
            return Err(AdapterError::new("mock model unavailable"));
        }
        Ok(images
            .iter()
            .zip(prompts)
            .map(|(image, prompt)| self.objects_for(image, prompt.as_deref(), thresholds))
            .collect())
    }
}
