use crate::{
    error::Result,
    types::{Contour, RasterMask},
};

/// Trait for contour extraction algorithms
pub trait ContourExtractor: Send + Sync {
    /// Trace every outer and hole border of the mask's foreground
    fn extract_contours(&self, mask: &RasterMask) -> Result<Vec<Contour>>;
}

/// Trait for polygon simplification algorithms
pub trait PolygonSimplifier: Send + Sync {
    /// Reduce a closed ring to fewer vertices within `tolerance` pixels
    fn simplify(&self, ring: &[[f64; 2]], tolerance: f64) -> Result<Vec<[f64; 2]>>;
}
