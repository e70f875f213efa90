pub mod builder;

use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::Result,
    traits::{ContourExtractor, PolygonSimplifier},
    types::{MaskGeometry, Polygon, RasterMask},
};

/// Mask to geometry conversion: pixel area, contour tracing, then simplification
pub struct GeometryConverter {
    contour_extractor: Box<dyn ContourExtractor>,
    simplifier: Box<dyn PolygonSimplifier>,
    tolerance: f64,
}

impl GeometryConverter {
    /// Create a new converter builder
    pub fn builder() -> builder::GeometryConverterBuilder {
        builder::GeometryConverterBuilder::new()
    }

    pub fn new(
        contour_extractor: Box<dyn ContourExtractor>,
        simplifier: Box<dyn PolygonSimplifier>,
        tolerance: f64,
    ) -> Self {
        Self {
            contour_extractor,
            simplifier,
            tolerance,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Convert one mask.
    ///
    /// `area` is the foreground pixel count, taken before tracing, so it does not
    /// depend on the tolerance. An empty mask yields no polygons.
    pub fn convert(&self, mask: &RasterMask) -> Result<MaskGeometry> {
        let area = mask.foreground_count() as f64;
        if area == 0.0 {
            return Ok(MaskGeometry::area_only(0.0));
        }

        let contours = self.contour_extractor.extract_contours(mask)?;
        let mut polygons = Vec::with_capacity(contours.len());
        for contour in &contours {
            let ring = self.simplifier.simplify(&contour.points, self.tolerance)?;
            polygons.extend(Polygon::new(ring));
        }

        debug!(
            contours = contours.len(),
            vertices = polygons.iter().map(Polygon::len).sum::<usize>(),
            area,
            "Converted mask to polygons"
        );

        Ok(MaskGeometry { polygons, area })
    }

    /// Convert masks in parallel. Output index i always belongs to input index i,
    /// and a failure for one mask does not affect the others.
    pub fn convert_batch(&self, masks: &[RasterMask]) -> Vec<Result<MaskGeometry>> {
        masks.par_iter().map(|mask| self.convert(mask)).collect()
    }

    /// Get information about the converter configuration
    pub fn info(&self) -> String {
        format!("GeometryConverter: border following, Douglas-Peucker at {} px", self.tolerance)
    }
}

impl Default for GeometryConverter {
    fn default() -> Self {
        builder::GeometryConverterBuilder::new().build_default()
    }
}
