use mask::MaskGeometry;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use visualize::EncodedImage;

use crate::error::ErrorDescriptor;

/// Encoded overlay attached to a result; bytes serialize as base64
pub type VisualizationImage = EncodedImage;

/// Axis-aligned box in original-image pixels with x1 <= x2 and y1 <= y2
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Build from (x1, y1, x2, y2), swapping corners given in the wrong order
    pub fn from_corners([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// One detected object. Detections keep the model's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    pub object_id: usize,
    pub bounding_box: BoundingBox,
    pub score: f64,
    pub geometry: MaskGeometry,
}

/// Result of a single-image request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InferenceResult {
    pub num_objects: usize,
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationImage>,
    /// Wall-clock time of the whole request, rounded to 0.01 ms
    pub processing_time_ms: f64,
}

impl InferenceResult {
    pub fn new(detections: Vec<Detection>, visualization: Option<VisualizationImage>, processing_time_ms: f64) -> Self {
        Self {
            num_objects: detections.len(),
            detections,
            visualization,
            processing_time_ms: round_ms(processing_time_ms),
        }
    }

    pub fn num_objects(&self) -> usize {
        self.detections.len()
    }

    pub fn boxes(&self) -> Vec<[f64; 4]> {
        self.detections.iter().map(|d| d.bounding_box.to_array()).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.detections.iter().map(|d| d.score).collect()
    }

    pub fn geometries(&self) -> Vec<MaskGeometry> {
        self.detections.iter().map(|d| d.geometry.clone()).collect()
    }
}

/// Outcome for one position of a batch request. `index` is the submission
/// position; a failed item has no detections and carries `error`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchItemResult {
    pub index: usize,
    pub num_objects: usize,
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl BatchItemResult {
    pub fn succeeded(index: usize, detections: Vec<Detection>, visualization: Option<VisualizationImage>) -> Self {
        Self {
            index,
            num_objects: detections.len(),
            detections,
            visualization,
            error: None,
        }
    }

    pub fn failed(index: usize, error: ErrorDescriptor) -> Self {
        Self {
            index,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a batch request, one item per submitted image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchResult {
    pub total_images: usize,
    pub results: Vec<BatchItemResult>,
    pub total_processing_time_ms: f64,
    pub average_time_per_image_ms: f64,
}

impl BatchResult {
    pub fn new(results: Vec<BatchItemResult>, total_processing_time_ms: f64) -> Self {
        let total_images = results.len();
        let average = if total_images > 0 {
            total_processing_time_ms / total_images as f64
        } else {
            0.0
        };
        Self {
            total_images,
            results,
            total_processing_time_ms: round_ms(total_processing_time_ms),
            average_time_per_image_ms: round_ms(average),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_ok()).count()
    }
}

/// Timing values are reported with two decimals
pub(crate) fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;

    #[test]
    fn test_bounding_box_is_normalized() {
        let bbox = BoundingBox::from_corners([30.0, 5.0, 10.0, 25.0]);
        assert_eq!(bbox.to_array(), [10.0, 5.0, 30.0, 25.0]);
        assert_eq!((bbox.width(), bbox.height()), (20.0, 20.0));
    }

    #[test]
    fn test_timing_is_rounded() {
        let result = InferenceResult::new(Vec::new(), None, 12.3456);
        assert_eq!(result.processing_time_ms, 12.35);

        let batch = BatchResult::new(vec![BatchItemResult::default(); 3], 10.0);
        assert_eq!(batch.total_images, 3);
        assert_eq!(batch.average_time_per_image_ms, 3.33);
    }

    #[test]
    fn test_failed_item_serializes_error() {
        let item = BatchItemResult::failed(
            1,
            ErrorDescriptor {
                kind: FaultKind::Validation,
                message: "too big".to_string(),
            },
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["index"], 1);
        assert_eq!(json["num_objects"], 0);
        assert_eq!(json["error"]["kind"], "validation");
        assert!(json.get("visualization").is_none());
    }
}
