use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use mask::RasterMask;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{Result, SegmentError},
    model::{AdapterError, ImagePredictions, ObjectPrediction, SegmentationModel, Thresholds},
    prompt::PromptSpec,
};

/// Recorded object: box, score and a grayscale mask whose intensity is the
/// foreground probability scaled to 0-255
#[derive(Debug, Clone)]
pub struct ReplayObject {
    pub bbox: [f64; 4],
    pub score: f64,
    pub mask: GrayImage,
}

/// Objects recorded for one text prompt. Entries without a prompt answer box
/// prompts and any text prompt that has no entry of its own.
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub prompt: Option<String>,
    pub objects: Vec<ReplayObject>,
}

#[derive(Deserialize)]
struct ReplayFile {
    entries: Vec<EntryRecord>,
}

#[derive(Deserialize)]
struct EntryRecord {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    objects: Vec<ObjectRecord>,
}

#[derive(Deserialize)]
struct ObjectRecord {
    #[serde(rename = "box")]
    bbox: [f64; 4],
    score: f64,
    /// PNG path, relative to the replay file
    mask: PathBuf,
}

/// Model adapter that serves predictions recorded on disk, so the pipeline
/// runs end to end without an inference runtime.
///
/// Thresholds are applied at serve time: objects scoring at or below the
/// detection threshold are dropped and masks are binarized with the mask
/// threshold.
#[derive(Debug, Clone)]
pub struct ReplayModel {
    entries: Vec<ReplayEntry>,
}

impl ReplayModel {
    pub fn new(entries: Vec<ReplayEntry>) -> Self {
        Self { entries }
    }

    /// Load a JSON replay file of the form
    /// `{"entries": [{"prompt": "cat", "objects": [{"box": [x1, y1, x2, y2], "score": 0.9, "mask": "cat0.png"}]}]}`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SegmentError::Replay {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file: ReplayFile = serde_json::from_str(&content).map_err(|e| SegmentError::Replay {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let entries = file
            .entries
            .into_iter()
            .map(|entry| {
                let objects = entry
                    .objects
                    .into_iter()
                    .map(|object| {
                        let mask_path = base.join(&object.mask);
                        let mask = image::open(&mask_path)
                            .map_err(|e| SegmentError::Replay {
                                path: mask_path.clone(),
                                reason: e.to_string(),
                            })?
                            .to_luma8();
                        Ok(ReplayObject {
                            bbox: object.bbox,
                            score: object.score,
                            mask,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ReplayEntry {
                    prompt: entry.prompt,
                    objects,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(path = %path.display(), entries = entries.len(), "Loaded replay predictions");
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[ReplayEntry] {
        &self.entries
    }

    fn entry_for(&self, text: Option<&str>) -> Option<&ReplayEntry> {
        let exact = text.and_then(|text| {
            let wanted = text.trim();
            self.entries.iter().find(|entry| {
                entry
                    .prompt
                    .as_deref()
                    .is_some_and(|p| p.trim().eq_ignore_ascii_case(wanted))
            })
        });
        exact.or_else(|| self.entries.iter().find(|entry| entry.prompt.is_none()))
    }

    fn serve(&self, image: &RgbImage, text: Option<&str>, thresholds: Thresholds) -> ImagePredictions {
        let Some(entry) = self.entry_for(text) else {
            debug!(prompt = ?text, "No recorded predictions for prompt");
            return Ok(Vec::new());
        };

        let mask_cutoff = (thresholds.mask * 255.0) as f32;
        entry
            .objects
            .iter()
            .filter(|object| object.score > thresholds.detection)
            .map(|object| {
                if object.mask.dimensions() != image.dimensions() {
                    return Err(AdapterError::new(format!(
                        "recorded mask is {:?} but image is {:?}",
                        object.mask.dimensions(),
                        image.dimensions()
                    )));
                }
                let mask = RasterMask::from_fn(image.width(), image.height(), |x, y| {
                    object.mask.get_pixel(x, y)[0] as f32 > mask_cutoff
                });
                Ok(ObjectPrediction {
                    bbox: object.bbox,
                    score: object.score,
                    mask,
                })
            })
            .collect()
    }
}

impl SegmentationModel for ReplayModel {
    fn predict(
        &self,
        image: &RgbImage,
        prompt: &PromptSpec,
        thresholds: Thresholds,
    ) -> std::result::Result<Vec<ObjectPrediction>, AdapterError> {
        let text = match prompt {
            PromptSpec::Text(text) => Some(text.as_str()),
            PromptSpec::Boxes(_) => None,
        };
        self.serve(image, text, thresholds)
    }

    fn predict_batch(
        &self,
        images: &[&RgbImage],
        prompts: &[Option<String>],
        thresholds: Thresholds,
    ) -> std::result::Result<Vec<ImagePredictions>, AdapterError> {
        if images.len() != prompts.len() {
            return Err(AdapterError::new(format!(
                "{} images but {} prompts",
                images.len(),
                prompts.len()
            )));
        }
        Ok(images
            .iter()
            .zip(prompts)
            .map(|(image, prompt)| self.serve(image, prompt.as_deref(), thresholds))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn object(score: f64, value: u8) -> ReplayObject {
        ReplayObject {
            bbox: [1.0, 1.0, 4.0, 4.0],
            score,
            mask: GrayImage::from_fn(8, 8, |x, y| if (1..5).contains(&x) && (1..5).contains(&y) { Luma([value]) } else { Luma([0]) }),
        }
    }

    fn model() -> ReplayModel {
        ReplayModel::new(vec![
            ReplayEntry {
                prompt: Some("cat".to_string()),
                objects: vec![object(0.9, 255), object(0.3, 255), object(0.8, 100)],
            },
            ReplayEntry {
                prompt: None,
                objects: vec![object(0.7, 255)],
            },
        ])
    }

    #[test]
    fn test_detection_threshold_drops_low_scores() {
        let image = RgbImage::new(8, 8);
        let objects = model().predict(&image, &PromptSpec::text("Cat"), Thresholds::default()).unwrap();
        let scores: Vec<f64> = objects.iter().map(|o| o.score).collect();
        assert_eq!(scores, vec![0.9, 0.8]);
        assert_eq!(objects[0].mask.foreground_count(), 16);
        // intensity 100 is below the 0.5 mask threshold
        assert_eq!(objects[1].mask.foreground_count(), 0);
    }

    #[test]
    fn test_unknown_prompt_falls_back_to_default_entry() {
        let image = RgbImage::new(8, 8);
        let objects = model().predict(&image, &PromptSpec::text("dog"), Thresholds::default()).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].score, 0.7);
    }

    #[test]
    fn test_mismatched_mask_is_an_adapter_error() {
        let image = RgbImage::new(16, 16);
        assert!(model().predict(&image, &PromptSpec::text("cat"), Thresholds::default()).is_err());
    }

    #[test]
    fn test_batch_keeps_per_image_outcomes() {
        let small = RgbImage::new(8, 8);
        let large = RgbImage::new(16, 16);
        let results = model()
            .predict_batch(&[&small, &large], &[Some("cat".to_string()), None], Thresholds::default())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_loads_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        object(0.9, 255).mask.save(dir.path().join("cat0.png")).unwrap();
        let json = r#"{"entries": [{"prompt": "cat", "objects": [{"box": [1, 1, 4, 4], "score": 0.9, "mask": "cat0.png"}]}]}"#;
        let path = dir.path().join("replay.json");
        std::fs::write(&path, json).unwrap();

        let model = ReplayModel::from_file(&path).unwrap();
        assert_eq!(model.entries().len(), 1);
        assert_eq!(model.entries()[0].objects[0].mask.dimensions(), (8, 8));
    }

    #[test]
    fn test_missing_mask_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(&path, r#"{"entries": [{"objects": [{"box": [0, 0, 1, 1], "score": 0.9, "mask": "gone.png"}]}]}"#).unwrap();
        assert!(matches!(ReplayModel::from_file(&path), Err(SegmentError::Replay { .. })));
    }
}
