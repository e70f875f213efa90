//! Overlay rendering for segmentation results: translucent mask fills in ramp
//! colors, box outlines and score labels, encoded as PNG or JPEG.

pub mod compositor;
pub mod encode;
pub mod error;
pub mod palette;

pub use compositor::{Compositor, VisualizationConfig};
pub use encode::{encode, EncodedImage, OutputFormat};
pub use error::{Result, VisualizeError};
pub use palette::ramp_colors;
