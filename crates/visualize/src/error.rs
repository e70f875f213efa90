use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisualizeError {
    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid visualization config: {0}")]
    InvalidConfig(String),

    #[error("Failed to load font: {0}")]
    Font(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VisualizeError>;
