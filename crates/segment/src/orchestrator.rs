use std::time::Instant;

use image::RgbImage;
use mask::{GeometryConverter, MaskGeometry, RasterMask};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use visualize::Compositor;

use crate::{
    config::Settings,
    error::{Result, SegmentError},
    model::{AdapterError, ImagePredictions, ObjectPrediction, SegmentationModel, Thresholds},
    prompt::{BoxPrompt, PromptSpec},
    result::{BatchItemResult, BatchResult, BoundingBox, Detection, InferenceResult, VisualizationImage},
};

/// Per-request knobs; unset thresholds fall back to the settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestOptions {
    pub threshold: Option<f64>,
    pub mask_threshold: Option<f64>,
    pub visualize: bool,
}

impl RequestOptions {
    pub fn visualized() -> Self {
        Self {
            visualize: true,
            ..Default::default()
        }
    }
}

/// Detections for one image plus any faults recovered along the way
struct Processed {
    detections: Vec<Detection>,
    visualization: Option<VisualizationImage>,
    faults: Vec<SegmentError>,
}

enum ItemInput {
    Rejected(SegmentError),
    Predicted(RgbImage, ImagePredictions),
}

/// Drives a model adapter and turns its output into results: limits, geometry
/// conversion, optional visualization and timing.
///
/// Holds no per-request state, so one instance serves concurrent requests.
pub struct Orchestrator<M> {
    model: M,
    settings: Settings,
    converter: GeometryConverter,
    compositor: Compositor,
}

impl<M: SegmentationModel> Orchestrator<M> {
    pub fn new(model: M, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let converter = settings.converter.build()?;
        let compositor = Compositor::new(settings.visualization.clone())?;
        info!(
            max_batch_size = settings.max_batch_size,
            max_image_dimension = settings.max_image_dimension,
            "{}",
            converter.info()
        );
        Ok(Self {
            model,
            settings,
            converter,
            compositor,
        })
    }

    /// Replace the geometry converter built from the settings
    pub fn with_converter(mut self, converter: GeometryConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn infer_text(&self, image_bytes: &[u8], text: &str, options: &RequestOptions) -> Result<InferenceResult> {
        self.infer(image_bytes, &PromptSpec::text(text), options)
    }

    pub fn infer_boxes(&self, image_bytes: &[u8], boxes: Vec<BoxPrompt>, options: &RequestOptions) -> Result<InferenceResult> {
        self.infer(image_bytes, &PromptSpec::Boxes(boxes), options)
    }

    /// Segment one image.
    ///
    /// Validation and adapter faults are returned as errors. A failed object
    /// conversion keeps the object with area-only geometry, and a failed
    /// visualization is left out; both are logged.
    pub fn infer(&self, image_bytes: &[u8], prompt: &PromptSpec, options: &RequestOptions) -> Result<InferenceResult> {
        let start = Instant::now();
        debug!(prompt = %prompt.describe(), bytes = image_bytes.len(), "Starting inference");

        let thresholds = self.thresholds(options)?;
        prompt.validate()?;
        let image = self.load_image(image_bytes).inspect_err(|e| warn!("Rejected image: {e}"))?;

        let predictions = self.model.predict(&image, prompt, thresholds)?;
        let processed = self.process(&image, predictions, options.visualize)?;
        for fault in &processed.faults {
            warn!(kind = %fault.kind(), "{fault}");
        }

        let result = InferenceResult::new(
            processed.detections,
            processed.visualization,
            start.elapsed().as_secs_f64() * 1000.0,
        );
        info!(
            objects = result.num_objects,
            time_ms = result.processing_time_ms,
            "Inference completed"
        );
        Ok(result)
    }

    /// Segment many images with one batched model call.
    ///
    /// Batch size and prompt count are checked up front and fail the whole
    /// request. Every other fault is confined to its item: `results[i]` always
    /// belongs to `images[i]`.
    pub fn infer_batch<B>(&self, images: &[B], prompts: &[Option<String>], options: &RequestOptions) -> Result<BatchResult>
    where
        B: AsRef<[u8]> + Sync,
    {
        let start = Instant::now();

        if images.is_empty() {
            return Err(SegmentError::EmptyBatch);
        }
        if images.len() > self.settings.max_batch_size {
            return Err(SegmentError::BatchTooLarge {
                size: images.len(),
                limit: self.settings.max_batch_size,
            });
        }
        if images.len() != prompts.len() {
            return Err(SegmentError::BatchLengthMismatch {
                images: images.len(),
                prompts: prompts.len(),
            });
        }
        let thresholds = self.thresholds(options)?;

        let loaded: Vec<Result<RgbImage>> = images
            .par_iter()
            .map(|bytes| self.load_image(bytes.as_ref()))
            .collect();

        let predictions = self.predict_valid(&loaded, prompts, thresholds);
        let mut predictions = predictions.into_iter();
        let work: Vec<ItemInput> = loaded
            .into_iter()
            .map(|loaded| match loaded {
                Ok(image) => {
                    let prediction = predictions
                        .next()
                        .unwrap_or_else(|| Err(AdapterError::new("no result for image")));
                    ItemInput::Predicted(image, prediction)
                }
                Err(e) => ItemInput::Rejected(e),
            })
            .collect();

        let mut slots = vec![BatchItemResult::default(); images.len()];
        slots
            .par_iter_mut()
            .zip(work.into_par_iter())
            .enumerate()
            .for_each(|(index, (slot, input))| {
                *slot = self.finish_item(index, input, options.visualize);
            });

        let result = BatchResult::new(slots, start.elapsed().as_secs_f64() * 1000.0);
        info!(
            images = result.total_images,
            failed = result.failed_count(),
            time_ms = result.total_processing_time_ms,
            "Batch inference completed"
        );
        Ok(result)
    }

    /// Call the model once for every image that passed validation. The
    /// returned list has one entry per valid image, in order.
    fn predict_valid(
        &self,
        loaded: &[Result<RgbImage>],
        prompts: &[Option<String>],
        thresholds: Thresholds,
    ) -> Vec<ImagePredictions> {
        let (valid_images, valid_prompts): (Vec<&RgbImage>, Vec<Option<String>>) = loaded
            .iter()
            .zip(prompts)
            .filter_map(|(image, prompt)| image.as_ref().ok().map(|image| (image, prompt.clone())))
            .unzip();
        if valid_images.is_empty() {
            return Vec::new();
        }

        let sent = valid_images.len();
        match self.model.predict_batch(&valid_images, &valid_prompts, thresholds) {
            Ok(outputs) if outputs.len() == sent => outputs,
            Ok(outputs) => {
                let err = AdapterError::new(format!("model returned {} results for {sent} images", outputs.len()));
                warn!("{err}");
                vec![Err(err); sent]
            }
            Err(err) => {
                warn!("Batched model call failed: {err}");
                vec![Err(err); sent]
            }
        }
    }

    fn finish_item(&self, index: usize, input: ItemInput, visualize: bool) -> BatchItemResult {
        let outcome = match input {
            ItemInput::Rejected(err) => Err(err),
            ItemInput::Predicted(image, prediction) => prediction
                .map_err(SegmentError::from)
                .and_then(|objects| self.process(&image, objects, visualize)),
        };

        match outcome {
            Ok(processed) => {
                let mut item = BatchItemResult::succeeded(index, processed.detections, processed.visualization);
                for fault in &processed.faults {
                    warn!(index, kind = %fault.kind(), "{fault}");
                }
                item.error = processed.faults.first().map(SegmentError::descriptor);
                item
            }
            Err(err) => {
                warn!(index, kind = %err.kind(), "Batch item failed: {err}");
                BatchItemResult::failed(index, err.descriptor())
            }
        }
    }

    /// Geometry and optional visualization for one image's objects
    fn process(&self, image: &RgbImage, objects: Vec<ObjectPrediction>, visualize: bool) -> Result<Processed> {
        if let Some(object) = objects.iter().find(|o| o.mask.dimensions() != image.dimensions()) {
            return Err(AdapterError::new(format!(
                "mask is {:?} but image is {:?}",
                object.mask.dimensions(),
                image.dimensions()
            ))
            .into());
        }

        let mut faults = Vec::new();
        let masks: Vec<RasterMask> = objects.iter().map(|o| o.mask.clone()).collect();
        let geometries = self.converter.convert_batch(&masks);

        let detections: Vec<Detection> = objects
            .iter()
            .zip(geometries)
            .enumerate()
            .map(|(object_id, (object, geometry))| {
                let geometry = geometry.unwrap_or_else(|e| {
                    faults.push(SegmentError::Conversion(e));
                    MaskGeometry::area_only(object.mask.foreground_count() as f64)
                });
                Detection {
                    object_id,
                    bounding_box: BoundingBox::from_corners(object.bbox),
                    score: object.score,
                    geometry,
                }
            })
            .collect();

        let visualization = if visualize && !detections.is_empty() {
            let boxes: Vec<[f64; 4]> = detections.iter().map(|d| d.bounding_box.to_array()).collect();
            let scores: Vec<f64> = detections.iter().map(|d| d.score).collect();
            match self.compositor.render(image, &masks, &boxes, Some(&scores)) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    faults.push(SegmentError::Compositing(e));
                    None
                }
            }
        } else {
            None
        };

        Ok(Processed {
            detections,
            visualization,
            faults,
        })
    }

    /// Size check on the encoded payload, then decode to RGB and check dimensions
    fn load_image(&self, bytes: &[u8]) -> Result<RgbImage> {
        let size = bytes.len() as f64;
        if size > self.settings.max_image_bytes() {
            return Err(SegmentError::ImageTooLarge {
                size_mb: size / (1024.0 * 1024.0),
                limit_mb: self.settings.max_image_size_mb,
            });
        }

        let image = image::load_from_memory(bytes)
            .map_err(SegmentError::ImageDecode)?
            .to_rgb8();

        let (width, height) = image.dimensions();
        let limit = self.settings.max_image_dimension;
        if width > limit || height > limit {
            return Err(SegmentError::DimensionExceeded { width, height, limit });
        }
        Ok(image)
    }

    fn thresholds(&self, options: &RequestOptions) -> Result<Thresholds> {
        let detection = options.threshold.unwrap_or(self.settings.threshold);
        let mask = options.mask_threshold.unwrap_or(self.settings.mask_threshold);
        for (name, value) in [("threshold", detection), ("mask_threshold", mask)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SegmentError::InvalidThreshold { name, value });
            }
        }
        Ok(Thresholds { detection, mask })
    }
}
