use geo_types::{Coord, LineString};
use image::{GrayImage, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{MaskError, Result};

/// Dense per-object foreground grid, sized to the original image.
///
/// Masks are immutable once built; every constructor binarizes its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl RasterMask {
    /// Create a mask from row-major foreground flags
    pub fn new(width: u32, height: u32, data: Vec<bool>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(MaskError::DimensionMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// A mask with no foreground pixels
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    /// Binarize a row-major probability grid; values strictly above `threshold` are foreground
    pub fn from_probabilities(width: u32, height: u32, values: &[f32], threshold: f32) -> Result<Self> {
        let data = values.iter().map(|&v| v > threshold).collect();
        Self::new(width, height, data)
    }

    /// Binarize a grayscale mask image; intensities strictly above `threshold` are foreground
    pub fn from_luma(image: &GrayImage, threshold: u8) -> Self {
        let data = image.pixels().map(|p| p[0] > threshold).collect();
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Foreground flag at (x, y); out-of-range coordinates are background
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Row-major foreground flags
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Exact number of foreground pixels
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// Render as a 0/255 grayscale image
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

/// Which side of a foreground region a traced border belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderKind {
    Outer,
    Hole,
}

/// A traced boundary in pixel coordinates, before simplification
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<[f64; 2]>,
    pub kind: BorderKind,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Closed ring of at least three vertices. The closing edge is implied;
/// the first vertex is not repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Polygon(Vec<[f64; 2]>);

impl Polygon {
    /// Returns `None` for rings with fewer than three vertices
    pub fn new(points: Vec<[f64; 2]>) -> Option<Self> {
        (points.len() >= 3).then_some(Self(points))
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_points(self) -> Vec<[f64; 2]> {
        self.0
    }

    /// Closed geo ring for geometric queries
    pub fn to_geo_polygon(&self) -> geo_types::Polygon<f64> {
        let coords: Vec<Coord<f64>> = self.0.iter().map(|&[x, y]| Coord { x, y }).collect();
        geo_types::Polygon::new(LineString::new(coords), vec![])
    }

    /// Shoelace area of the ring. Differs from the mask's pixel area.
    pub fn approximate_area(&self) -> f64 {
        use geo::Area;
        self.to_geo_polygon().unsigned_area()
    }
}

/// Vector form of one object's mask
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct MaskGeometry {
    /// Outer boundaries and hole boundaries, flattened without nesting
    pub polygons: Vec<Polygon>,
    /// Foreground pixel count of the source mask
    pub area: f64,
}

impl MaskGeometry {
    /// Geometry for an object whose outline could not be traced
    pub fn area_only(area: f64) -> Self {
        Self {
            polygons: Vec::new(),
            area,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().map(Polygon::len).sum()
    }
}
