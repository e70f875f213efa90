use crate::{
    algorithms::{ImageprocContourExtractor, DouglasPeuckerSimplifier, DEFAULT_TOLERANCE},
    error::{MaskError, Result},
    pipeline::GeometryConverter,
    traits::{ContourExtractor, PolygonSimplifier},
};

/// Builder for creating geometry converters with a fluent API
pub struct GeometryConverterBuilder {
    contour_extractor: Option<Box<dyn ContourExtractor>>,
    simplifier: Option<Box<dyn PolygonSimplifier>>,
    tolerance: f64,
}

impl GeometryConverterBuilder {
    pub fn new() -> Self {
        Self {
            contour_extractor: None,
            simplifier: None,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Simplification tolerance in pixels
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the contour extractor (replaces any existing one)
    pub fn set_contour_extractor<E>(mut self, extractor: E) -> Self
    where
        E: ContourExtractor + 'static,
    {
        self.contour_extractor = Some(Box::new(extractor));
        self
    }

    /// Set the simplifier (replaces any existing one)
    pub fn set_simplifier<S>(mut self, simplifier: S) -> Self
    where
        S: PolygonSimplifier + 'static,
    {
        self.simplifier = Some(Box::new(simplifier));
        self
    }

    /// Build the converter with default components if not specified
    pub fn build(self) -> Result<GeometryConverter> {
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(MaskError::InvalidTolerance(self.tolerance));
        }
        Ok(self.build_default())
    }

    pub(crate) fn build_default(self) -> GeometryConverter {
        let contour_extractor = self
            .contour_extractor
            .unwrap_or_else(|| Box::new(ImageprocContourExtractor));
        let simplifier = self
            .simplifier
            .unwrap_or_else(|| Box::new(DouglasPeuckerSimplifier));

        GeometryConverter::new(contour_extractor, simplifier, self.tolerance)
    }
}

impl Default for GeometryConverterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let converter = GeometryConverterBuilder::new().build().unwrap();
        assert_eq!(converter.tolerance(), 1.5);
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let result = GeometryConverterBuilder::new().with_tolerance(-0.5).build();
        assert!(matches!(result, Err(MaskError::InvalidTolerance(t)) if t == -0.5));
    }
}
