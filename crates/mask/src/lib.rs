//! # Mask Geometry Library
//!
//! Converts per-object binary segmentation masks into compact vector geometry:
//! polygons in original-image pixel coordinates plus the exact pixel area.
//!
//! ## Core Features
//!
//! - **Border following**: outer and hole boundaries of 8-connected regions,
//!   including regions touching the image edge
//! - **Closed-ring simplification**: Douglas-Peucker with a pixel tolerance,
//!   never below three vertices
//! - **Batch conversion**: order-preserving, parallel across masks
//! - **GeoJSON Support**: export/import of per-object geometry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mask::{GeometryConverter, RasterMask};
//!
//! let image = image::open("mask.png")?.to_luma8();
//! let mask = RasterMask::from_luma(&image, 127);
//!
//! let converter = GeometryConverter::builder().with_tolerance(2.0).build()?;
//! let geometry = converter.convert(&mask)?;
//! println!("{} polygons, area {}", geometry.polygons.len(), geometry.area);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod algorithms;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use algorithms::*;
pub use error::{MaskError, Result};
pub use io::*;
pub use pipeline::{builder::GeometryConverterBuilder, GeometryConverter};
pub use traits::*;
pub use types::{BorderKind, Contour, MaskGeometry, Polygon, RasterMask};
