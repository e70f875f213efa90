//! # Segmentation Results
//!
//! Turns the raw output of a promptable segmentation model into structured,
//! transport-safe results. For every request the [`Orchestrator`]:
//!
//! - enforces payload, dimension and batch limits before the model runs
//! - calls the model adapter once per image, or once per batch
//! - converts every object mask into polygons and pixel area
//! - optionally composites masks, boxes and scores into an overlay image
//! - reports timing, and isolates failures per batch item
//!
//! ```rust,no_run
//! use segment::{Orchestrator, ReplayModel, RequestOptions, Settings};
//!
//! let model = ReplayModel::from_file("predictions/replay.json")?;
//! let orchestrator = Orchestrator::new(model, Settings::default())?;
//! let bytes = std::fs::read("photo.png")?;
//! let result = orchestrator.infer_text(&bytes, "cat", &RequestOptions::visualized())?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod mocks;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod result;

pub use config::{ConverterSettings, Settings};
pub use error::{ErrorDescriptor, FaultKind, Result, SegmentError};
pub use model::{AdapterError, ObjectPrediction, ReplayModel, SegmentationModel, Thresholds};
pub use orchestrator::{Orchestrator, RequestOptions};
pub use prompt::{parse_text_prompts, BoxLabel, BoxPrompt, PromptSpec};
pub use result::{BatchItemResult, BatchResult, BoundingBox, Detection, InferenceResult, VisualizationImage};
