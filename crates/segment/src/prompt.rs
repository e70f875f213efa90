use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SegmentError};

/// Whether a box marks a region to include or to exclude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BoxLabel {
    Negative,
    #[default]
    Positive,
}

impl BoxLabel {
    pub fn as_int(&self) -> u8 {
        match self {
            BoxLabel::Negative => 0,
            BoxLabel::Positive => 1,
        }
    }
}

/// One prompt box in original-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoxPrompt {
    /// (x1, y1, x2, y2)
    pub bbox: [f64; 4],
    #[serde(default)]
    pub label: BoxLabel,
}

/// What the model is asked to segment. Text and boxes never mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum PromptSpec {
    Text(String),
    Boxes(Vec<BoxPrompt>),
}

impl PromptSpec {
    pub fn text(text: impl Into<String>) -> Self {
        PromptSpec::Text(text.into())
    }

    /// Parse `[[x1, y1, x2, y2, label?], ...]`. A missing label means positive.
    pub fn boxes_from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| SegmentError::MalformedPrompt(format!("invalid JSON for bounding boxes: {e}")))?;
        let rows = value
            .as_array()
            .ok_or_else(|| SegmentError::MalformedPrompt("bounding boxes must be a JSON array".to_string()))?;

        let boxes = rows
            .iter()
            .enumerate()
            .map(|(i, row)| parse_box(i, row))
            .collect::<Result<Vec<_>>>()?;

        let prompt = PromptSpec::Boxes(boxes);
        prompt.validate()?;
        Ok(prompt)
    }

    /// Reject prompts the model cannot use
    pub fn validate(&self) -> Result<()> {
        match self {
            PromptSpec::Text(text) if text.trim().is_empty() => {
                Err(SegmentError::MalformedPrompt("text prompt is empty".to_string()))
            }
            PromptSpec::Boxes(boxes) if boxes.is_empty() => {
                Err(SegmentError::MalformedPrompt("at least one bounding box is required".to_string()))
            }
            PromptSpec::Boxes(boxes) => match boxes.iter().position(|b| b.bbox.iter().any(|v| !v.is_finite())) {
                Some(i) => Err(SegmentError::MalformedPrompt(format!("box {i} has non-finite coordinates"))),
                None => Ok(()),
            },
            PromptSpec::Text(_) => Ok(()),
        }
    }

    /// Short form for logs
    pub fn describe(&self) -> String {
        match self {
            PromptSpec::Text(text) => format!("text {text:?}"),
            PromptSpec::Boxes(boxes) => format!("{} boxes", boxes.len()),
        }
    }
}

fn parse_box(index: usize, row: &Value) -> Result<BoxPrompt> {
    let malformed = |reason: &str| SegmentError::MalformedPrompt(format!("box {index}: {reason}"));

    let values = row.as_array().ok_or_else(|| malformed("expected [x1, y1, x2, y2, label]"))?;
    if !(4..=5).contains(&values.len()) {
        return Err(malformed(&format!("expected 4 or 5 numbers, got {}", values.len())));
    }

    let mut bbox = [0.0; 4];
    for (slot, value) in bbox.iter_mut().zip(values) {
        *slot = value.as_f64().ok_or_else(|| malformed("coordinates must be numbers"))?;
    }

    let label = match values.get(4).map(Value::as_f64) {
        None => BoxLabel::Positive,
        Some(Some(v)) if v == 1.0 => BoxLabel::Positive,
        Some(Some(v)) if v == 0.0 => BoxLabel::Negative,
        Some(_) => return Err(malformed("label must be 0 or 1")),
    };

    Ok(BoxPrompt { bbox, label })
}

/// Parse a JSON array of per-image text prompts, `null` meaning none
pub fn parse_text_prompts(json: &str) -> Result<Vec<Option<String>>> {
    serde_json::from_str(json)
        .map_err(|e| SegmentError::MalformedPrompt(format!("invalid JSON for text prompts: {e}")))
}
