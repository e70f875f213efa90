use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, Contour as TracedBorder};

use crate::{
    error::Result,
    traits::ContourExtractor,
    types::{BorderKind, Contour, RasterMask},
};

/// Borders with fewer traced points than this are noise
pub const MIN_CONTOUR_POINTS: usize = 3;

/// Suzuki-Abe border following via imageproc, over an 8-connected foreground.
///
/// Every outer border and every hole border is reported as its own contour,
/// in raster order of the border's first pixel. The mask is padded with one
/// background pixel on each side before tracing, since imageproc does not
/// start borders in the first column or close them on the last one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocContourExtractor;

impl ContourExtractor for ImageprocContourExtractor {
    fn extract_contours(&self, mask: &RasterMask) -> Result<Vec<Contour>> {
        let borders = find_contours::<i32>(&padded(mask));

        let contours = borders
            .iter()
            .enumerate()
            .filter(|(_, border)| border.points.len() >= MIN_CONTOUR_POINTS)
            .map(|(i, border)| Contour {
                points: border
                    .points
                    .iter()
                    .map(|p| [(p.x - 1) as f64, (p.y - 1) as f64])
                    .collect(),
                kind: kind_of(&borders, i),
            })
            .collect();

        Ok(contours)
    }
}

/// Mask as a 0/255 image with a one-pixel background frame
fn padded(mask: &RasterMask) -> GrayImage {
    GrayImage::from_fn(mask.width() + 2, mask.height() + 2, |x, y| {
        let inside = x > 0 && y > 0 && mask.get(x - 1, y - 1);
        Luma([if inside { 255 } else { 0 }])
    })
}

/// Borders alternate outer/hole with nesting depth
fn kind_of(borders: &[TracedBorder<i32>], index: usize) -> BorderKind {
    let mut depth = 0;
    let mut parent = borders[index].parent;
    while let Some(p) = parent {
        depth += 1;
        parent = borders[p].parent;
    }
    if depth % 2 == 0 {
        BorderKind::Outer
    } else {
        BorderKind::Hole
    }
}
