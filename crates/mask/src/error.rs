use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Failed to load mask image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Mask data has {actual} values, expected {width}x{height} = {expected}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid simplification tolerance: {0}")]
    InvalidTolerance(f64),

    #[error("Geometric computation error: {0}")]
    GeometricComputation(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MaskError>;
