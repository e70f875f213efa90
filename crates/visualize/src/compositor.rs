use std::path::PathBuf;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Pixel, Rgba, RgbaImage, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use mask::RasterMask;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    encode::{encode, EncodedImage, OutputFormat},
    error::{Result, VisualizeError},
    palette::ramp_colors,
};

/// Box outline thickness in pixels
pub const BOX_THICKNESS: i32 = 3;
/// Score labels sit this far above the box's top edge
pub const LABEL_OFFSET: f64 = 15.0;

/// Label face used when no `font_path` is configured
const DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn default_alpha() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_quality() -> u8 {
    95
}

fn default_font_size() -> f32 {
    16.0
}

/// How overlays are drawn and encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualizationConfig {
    /// Opacity of the mask fill, 0 to 1
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_true")]
    pub draw_boxes: bool,
    #[serde(default = "default_true")]
    pub draw_masks: bool,
    #[serde(default)]
    pub format: OutputFormat,
    /// JPEG quality, 1 to 100
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// TTF/OTF font for score labels; the bundled DejaVu Sans is used without one
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            draw_boxes: true,
            draw_masks: true,
            format: OutputFormat::default(),
            quality: default_quality(),
            font_path: None,
            font_size: default_font_size(),
        }
    }
}

impl VisualizationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(VisualizeError::InvalidConfig(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(VisualizeError::InvalidConfig(format!(
                "quality must be within 1-100, got {}",
                self.quality
            )));
        }
        if self.font_size.is_nan() || self.font_size <= 0.0 {
            return Err(VisualizeError::InvalidConfig(format!(
                "font size must be positive, got {}",
                self.font_size
            )));
        }
        Ok(())
    }
}

/// Overlays translucent masks, box outlines and score labels onto a source image.
///
/// Masks are painted first in object order, so later objects cover earlier ones,
/// then all boxes and labels on top.
pub struct Compositor {
    config: VisualizationConfig,
    font: FontArc,
}

impl Compositor {
    pub fn new(config: VisualizationConfig) -> Result<Self> {
        config.validate()?;
        let font = match &config.font_path {
            Some(path) => {
                let data = std::fs::read(path)?;
                FontArc::try_from_vec(data).map_err(|e| VisualizeError::Font(format!("{}: {e}", path.display())))?
            }
            None => FontArc::try_from_slice(DEFAULT_FONT).map_err(|e| VisualizeError::Font(e.to_string()))?,
        };
        Ok(Self { config, font })
    }

    pub fn config(&self) -> &VisualizationConfig {
        &self.config
    }

    /// Draw all objects onto a copy of `image`.
    ///
    /// `masks` and `boxes` are indexed by object and must have the same length;
    /// so must `scores` when given. Boxes are (x1, y1, x2, y2) in pixels.
    pub fn compose(
        &self,
        image: &RgbImage,
        masks: &[RasterMask],
        boxes: &[[f64; 4]],
        scores: Option<&[f64]>,
    ) -> Result<RgbImage> {
        check_inputs(image, masks, boxes, scores)?;

        let count = masks.len();
        if count == 0 {
            warn!("No objects to visualize");
            return Ok(image.clone());
        }

        let colors = ramp_colors(count);
        let mut canvas = DynamicImage::ImageRgb8(image.clone()).to_rgba8();

        if self.config.draw_masks {
            let alpha = (self.config.alpha * 255.0) as u8;
            for (mask, color) in masks.iter().zip(&colors) {
                fill_mask(&mut canvas, mask, Rgba([color[0], color[1], color[2], alpha]));
            }
        }

        if self.config.draw_boxes {
            for (i, (bbox, &color)) in boxes.iter().zip(&colors).enumerate() {
                outline_box(&mut canvas, bbox, color);
                if let Some(score) = scores.map(|s| s[i]) {
                    self.draw_label(&mut canvas, bbox, color, &format!("{score:.2}"));
                }
            }
        }

        debug!(objects = count, "Composited visualization");
        Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
    }

    /// Compose and encode in the configured format
    pub fn render(
        &self,
        image: &RgbImage,
        masks: &[RasterMask],
        boxes: &[[f64; 4]],
        scores: Option<&[f64]>,
    ) -> Result<EncodedImage> {
        let composed = self.compose(image, masks, boxes, scores)?;
        encode(&composed, self.config.format, self.config.quality)
    }

    fn draw_label(&self, canvas: &mut RgbaImage, bbox: &[f64; 4], color: Rgba<u8>, text: &str) {
        let (x, y) = label_origin(bbox, canvas.dimensions());
        draw_text_mut(canvas, color, x, y, PxScale::from(self.config.font_size), &self.font, text);
    }
}

fn check_inputs(image: &RgbImage, masks: &[RasterMask], boxes: &[[f64; 4]], scores: Option<&[f64]>) -> Result<()> {
    if masks.len() != boxes.len() {
        return Err(VisualizeError::InvalidInput(format!(
            "{} masks but {} boxes",
            masks.len(),
            boxes.len()
        )));
    }
    if let Some(scores) = scores {
        if scores.len() != masks.len() {
            return Err(VisualizeError::InvalidInput(format!(
                "{} masks but {} scores",
                masks.len(),
                scores.len()
            )));
        }
    }
    for (i, mask) in masks.iter().enumerate() {
        if mask.dimensions() != image.dimensions() {
            return Err(VisualizeError::InvalidInput(format!(
                "mask {i} is {:?}, image is {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }
    }
    Ok(())
}

fn fill_mask(canvas: &mut RgbaImage, mask: &RasterMask, overlay: Rgba<u8>) {
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if mask.get(x, y) {
            pixel.blend(&overlay);
        }
    }
}

/// Top-left corner of a score label, kept inside the image
fn label_origin(bbox: &[f64; 4], (width, height): (u32, u32)) -> (i32, i32) {
    let x = bbox[0].round().clamp(0.0, f64::from(width.saturating_sub(1)));
    let y = (bbox[1] - LABEL_OFFSET).round().clamp(0.0, f64::from(height.saturating_sub(1)));
    (x as i32, y as i32)
}

/// Outline drawn inward from the box edges
fn outline_box(canvas: &mut RgbaImage, bbox: &[f64; 4], color: Rgba<u8>) {
    // edges further out than the outline thickness never reach the canvas
    let (width, height) = canvas.dimensions();
    let margin = f64::from(BOX_THICKNESS);
    let x_range = (-margin, f64::from(width) + margin);
    let y_range = (-margin, f64::from(height) + margin);
    let [x1, y1, x2, y2] = [
        bbox[0].clamp(x_range.0, x_range.1),
        bbox[1].clamp(y_range.0, y_range.1),
        bbox[2].clamp(x_range.0, x_range.1),
        bbox[3].clamp(y_range.0, y_range.1),
    ]
    .map(|v| v.round() as i32);
    for t in 0..BOX_THICKNESS {
        let width = x2 - x1 + 1 - 2 * t;
        let height = y2 - y1 + 1 - 2 * t;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(x1 + t, y1 + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gray(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([100, 100, 100]))
    }

    fn square_mask(width: u32, height: u32, x0: u32, y0: u32, size: u32) -> RasterMask {
        RasterMask::from_fn(width, height, |x, y| (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y))
    }

    #[test]
    fn test_rejects_out_of_range_config() {
        let config = VisualizationConfig {
            alpha: 1.5,
            ..Default::default()
        };
        assert!(Compositor::new(config).is_err());
        let config = VisualizationConfig {
            quality: 0,
            ..Default::default()
        };
        assert!(Compositor::new(config).is_err());
    }

    #[test]
    fn test_missing_font_file_is_an_error() {
        let config = VisualizationConfig {
            font_path: Some("/nonexistent/font.ttf".into()),
            ..Default::default()
        };
        assert!(Compositor::new(config).is_err());
    }

    #[test]
    fn test_zero_objects_returns_source() {
        let compositor = Compositor::new(VisualizationConfig::default()).unwrap();
        let source = gray(20, 10);
        assert_eq!(compositor.compose(&source, &[], &[], None).unwrap(), source);
    }

    #[test]
    fn test_mask_fill_blends_with_alpha() {
        let config = VisualizationConfig {
            draw_boxes: false,
            ..Default::default()
        };
        let compositor = Compositor::new(config).unwrap();
        let source = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let mask = square_mask(8, 8, 2, 2, 4);
        let out = compositor.compose(&source, &[mask], &[[2.0, 2.0, 5.0, 5.0]], None).unwrap();

        // single object uses the ramp start (127, 0, 255) at alpha 127/255
        let inside = out.get_pixel(3, 3);
        assert!((60..=66).contains(&inside[0]), "{inside:?}");
        assert_eq!(inside[1], 0);
        assert!((124..=130).contains(&inside[2]), "{inside:?}");
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_outline_is_three_pixels_in_object_color() {
        let config = VisualizationConfig {
            draw_masks: false,
            ..Default::default()
        };
        let compositor = Compositor::new(config).unwrap();
        let source = gray(40, 40);
        let out = compositor
            .compose(&source, &[RasterMask::empty(40, 40)], &[[10.0, 10.0, 30.0, 30.0]], None)
            .unwrap();

        let color = Rgb([127, 0, 255]);
        for t in 0..3 {
            assert_eq!(*out.get_pixel(10 + t, 20), color);
            assert_eq!(*out.get_pixel(20, 30 - t), color);
        }
        assert_eq!(*out.get_pixel(13, 20), Rgb([100, 100, 100]));
        assert_eq!(*out.get_pixel(9, 20), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_boxes_are_drawn_over_masks() {
        let compositor = Compositor::new(VisualizationConfig::default()).unwrap();
        let source = gray(40, 40);
        let masks = vec![RasterMask::empty(40, 40), square_mask(40, 40, 0, 0, 40)];
        let boxes = [[5.0, 5.0, 20.0, 20.0], [0.0, 0.0, 39.0, 39.0]];
        let out = compositor.compose(&source, &masks, &boxes, None).unwrap();

        // first object's outline stays opaque even under the second mask
        assert_eq!(*out.get_pixel(5, 12), Rgb([127, 0, 255]));
    }

    #[test]
    fn test_score_label_is_drawn_above_box() {
        let config = VisualizationConfig {
            draw_masks: false,
            ..Default::default()
        };
        let compositor = Compositor::new(config).unwrap();
        let source = gray(60, 60);
        let boxes = [[10.0, 30.0, 50.0, 55.0]];
        let without = compositor.compose(&source, &[RasterMask::empty(60, 60)], &boxes, None).unwrap();
        let with = compositor
            .compose(&source, &[RasterMask::empty(60, 60)], &boxes, Some(&[0.87]))
            .unwrap();

        let changed: Vec<(u32, u32)> = with
            .enumerate_pixels()
            .filter(|&(x, y, p)| p != without.get_pixel(x, y))
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!changed.is_empty());
        assert!(changed.iter().all(|&(_, y)| (15..30).contains(&y)));
    }

    #[test]
    fn test_label_near_top_edge_is_moved_into_image() {
        assert_eq!(label_origin(&[10.0, 30.0, 50.0, 55.0], (60, 60)), (10, 15));
        assert_eq!(label_origin(&[10.0, 4.0, 50.0, 55.0], (60, 60)), (10, 0));
        assert_eq!(label_origin(&[-8.0, -20.0, 50.0, 55.0], (60, 60)), (0, 0));
        assert_eq!(label_origin(&[90.0, 80.0, 95.0, 99.0], (60, 60)), (59, 59));
    }

    #[test]
    fn test_label_for_box_at_top_edge_stays_visible() {
        let config = VisualizationConfig {
            draw_masks: false,
            ..Default::default()
        };
        let compositor = Compositor::new(config).unwrap();
        let source = gray(60, 60);
        let boxes = [[10.0, 2.0, 50.0, 55.0]];
        let without = compositor.compose(&source, &[RasterMask::empty(60, 60)], &boxes, None).unwrap();
        let with = compositor
            .compose(&source, &[RasterMask::empty(60, 60)], &boxes, Some(&[0.87]))
            .unwrap();

        // glyphs land inside the box, below its three outline rows
        let inside_box = with
            .enumerate_pixels()
            .filter(|&(x, y, p)| y >= 5 && x >= 13 && p != without.get_pixel(x, y))
            .count();
        assert!(inside_box > 0);
    }

    #[test]
    fn test_default_compositor_uses_bundled_font() {
        let compositor = Compositor::new(VisualizationConfig::default()).unwrap();
        let (width, _) = imageproc::drawing::text_size(PxScale::from(16.0), &compositor.font, "0.87");
        assert!(width > 0);
    }

    #[test]
    fn test_custom_font_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.ttf");
        std::fs::write(&path, DEFAULT_FONT).unwrap();
        let config = VisualizationConfig {
            font_path: Some(path),
            ..Default::default()
        };
        assert!(Compositor::new(config).is_ok());

        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let config = VisualizationConfig {
            font_path: Some(bogus),
            ..Default::default()
        };
        assert!(matches!(Compositor::new(config), Err(VisualizeError::Font(_))));
    }

    #[test]
    fn test_huge_box_coordinates_are_clipped() {
        let config = VisualizationConfig {
            draw_masks: false,
            ..Default::default()
        };
        let compositor = Compositor::new(config).unwrap();
        let source = gray(20, 20);
        let masks = [RasterMask::empty(20, 20)];
        let boxes = [[-3e9, 0.0, 3e9, 10.0]];
        let labelled = compositor.compose(&source, &masks, &boxes, Some(&[0.5])).unwrap();
        assert_eq!(labelled.dimensions(), (20, 20));

        let out = compositor.compose(&source, &masks, &boxes, None).unwrap();
        // top and bottom edges span the whole width, side edges fall outside
        assert_eq!(*out.get_pixel(0, 0), Rgb([127, 0, 255]));
        assert_eq!(*out.get_pixel(19, 10), Rgb([127, 0, 255]));
        assert_eq!(*out.get_pixel(0, 5), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let compositor = Compositor::new(VisualizationConfig::default()).unwrap();
        let source = gray(10, 10);
        let mask = RasterMask::empty(10, 10);
        assert!(compositor.compose(&source, &[mask.clone()], &[], None).is_err());
        assert!(compositor
            .compose(&source, &[mask], &[[0.0, 0.0, 1.0, 1.0]], Some(&[0.5, 0.6]))
            .is_err());
        assert!(compositor
            .compose(&source, &[RasterMask::empty(5, 5)], &[[0.0, 0.0, 1.0, 1.0]], None)
            .is_err());
    }
}
