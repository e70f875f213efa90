use std::path::Path;

use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    RgbImage,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, VisualizeError};

/// Raster format of an encoded visualization
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum OutputFormat {
    /// Lossless
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// Encoded image bytes together with their format and pixel size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncodedImage {
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Base64 in serialized form
    #[serde(rename = "data", with = "base64_bytes")]
    #[schemars(with = "String")]
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Encode an RGB image. `quality` applies to JPEG only and must be 1-100.
pub fn encode(image: &RgbImage, format: OutputFormat, quality: u8) -> Result<EncodedImage> {
    let mut bytes = Vec::new();
    match format {
        OutputFormat::Png => image.write_with_encoder(PngEncoder::new(&mut bytes))?,
        OutputFormat::Jpeg => {
            if !(1..=100).contains(&quality) {
                return Err(VisualizeError::InvalidConfig(format!(
                    "JPEG quality must be within 1-100, got {quality}"
                )));
            }
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?
        }
    }

    Ok(EncodedImage {
        format,
        width: image.width(),
        height: image.height(),
        bytes,
    })
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
