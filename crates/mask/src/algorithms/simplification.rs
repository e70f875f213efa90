use geo::Simplify;
use geo_types::{Coord, LineString};

use crate::{
    error::{MaskError, Result},
    traits::PolygonSimplifier,
};

/// Default simplification tolerance in pixels
pub const DEFAULT_TOLERANCE: f64 = 1.5;

/// Ramer-Douglas-Peucker simplification of closed rings, using geo's implementation.
///
/// A ring has no natural endpoints, so it is split at vertex 0 and at the vertex
/// farthest from it and both chains are simplified separately. The two anchors are
/// always kept. Output is an open ring (the closing edge is implied).
#[derive(Debug, Clone, Copy, Default)]
pub struct DouglasPeuckerSimplifier;

impl PolygonSimplifier for DouglasPeuckerSimplifier {
    fn simplify(&self, ring: &[[f64; 2]], tolerance: f64) -> Result<Vec<[f64; 2]>> {
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(MaskError::InvalidTolerance(tolerance));
        }
        if ring.len() <= 3 {
            return Ok(ring.to_vec());
        }

        let Some(split) = farthest_from_first(ring) else {
            // every vertex coincides with the first
            return Ok(ring.to_vec());
        };

        let forward = simplify_chain(ring[..=split].iter().copied(), tolerance);
        let backward = simplify_chain(
            ring[split..].iter().chain(std::iter::once(&ring[0])).copied(),
            tolerance,
        );

        // backward starts at the split vertex and ends on vertex 0, both already in forward
        let mut simplified = forward;
        if backward.len() > 2 {
            simplified.extend_from_slice(&backward[1..backward.len() - 1]);
        }

        if simplified.len() < 3 {
            return Ok(ring.to_vec());
        }
        Ok(simplified)
    }
}

/// Index of the vertex farthest from vertex 0; first occurrence wins ties
fn farthest_from_first(ring: &[[f64; 2]]) -> Option<usize> {
    let [x0, y0] = ring[0];
    let mut best = None;
    let mut best_distance = 0.0;
    for (i, &[x, y]) in ring.iter().enumerate().skip(1) {
        let distance = (x - x0).hypot(y - y0);
        if distance > best_distance {
            best_distance = distance;
            best = Some(i);
        }
    }
    best
}

fn simplify_chain(points: impl Iterator<Item = [f64; 2]>, tolerance: f64) -> Vec<[f64; 2]> {
    let line: LineString<f64> = points.map(|[x, y]| Coord { x, y }).collect();
    line.simplify(&tolerance)
        .coords()
        .map(|coord| [coord.x, coord.y])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::ImageprocContourExtractor,
        traits::ContourExtractor,
        types::RasterMask,
    };

    fn traced(mask: &RasterMask) -> Vec<[f64; 2]> {
        let contours = ImageprocContourExtractor.extract_contours(mask).unwrap();
        contours[0].points.clone()
    }

    /// Perpendicular distance from `p` to the segment a-b
    fn segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        let len2 = dx * dx + dy * dy;
        if len2 == 0.0 {
            return (p[0] - a[0]).hypot(p[1] - a[1]);
        }
        let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0);
        (p[0] - (a[0] + t * dx)).hypot(p[1] - (a[1] + t * dy))
    }

    #[test]
    fn test_rectangle_border_collapses_to_corners() {
        let ring = traced(&RasterMask::from_fn(500, 500, |_, _| true));
        let simplified = DouglasPeuckerSimplifier.simplify(&ring, 1.5).unwrap();
        assert_eq!(
            simplified,
            vec![[0.0, 0.0], [0.0, 499.0], [499.0, 499.0], [499.0, 0.0]]
        );
    }

    #[test]
    fn test_rejects_negative_or_nan_tolerance() {
        let ring = vec![[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0]];
        assert!(matches!(
            DouglasPeuckerSimplifier.simplify(&ring, -1.0),
            Err(MaskError::InvalidTolerance(_))
        ));
        assert!(DouglasPeuckerSimplifier.simplify(&ring, f64::NAN).is_err());
    }

    #[test]
    fn test_never_drops_below_three_vertices() {
        // a one-pixel-wide line traces back over itself
        let ring = traced(&RasterMask::from_fn(10, 3, |_, y| y == 1));
        let simplified = DouglasPeuckerSimplifier.simplify(&ring, 1.5).unwrap();
        assert!(simplified.len() >= 3);
        assert_eq!(simplified, ring);
    }

    #[test]
    fn test_two_pixel_sliver_keeps_full_ring_once_rdp_collapses_it() {
        // both long sides sit one pixel apart, so tolerances of 1 and above
        // reduce the ring to two vertices and the unsimplified ring is kept
        let ring = traced(&RasterMask::from_fn(25, 2, |_, _| true));
        assert_eq!(ring.len(), 50);

        assert_eq!(DouglasPeuckerSimplifier.simplify(&ring, 0.5).unwrap().len(), 4);
        assert_eq!(DouglasPeuckerSimplifier.simplify(&ring, 1.0).unwrap(), ring);
        assert_eq!(DouglasPeuckerSimplifier.simplify(&ring, 1.5).unwrap(), ring);
    }

    #[test]
    fn test_vertex_count_is_monotonic_in_tolerance() {
        let mask = RasterMask::from_fn(64, 64, |x, y| {
            let (dx, dy) = (x as f64 - 32.0, y as f64 - 32.0);
            dx.hypot(dy) < 25.0 + 4.0 * (dy.atan2(dx) * 5.0).sin()
        });
        let ring = traced(&mask);
        let counts: Vec<usize> = [0.0, 0.5, 1.0, 1.5, 3.0, 6.0, 12.0]
            .iter()
            .map(|&eps| DouglasPeuckerSimplifier.simplify(&ring, eps).unwrap().len())
            .collect();
        assert!(counts.windows(2).all(|w| w[1] <= w[0]), "counts: {counts:?}");
        assert!(counts[0] > counts[counts.len() - 1]);
    }

    #[test]
    fn test_discarded_points_stay_within_tolerance() {
        let mask = RasterMask::from_fn(40, 30, |x, y| x + y < 50 && x > 3 && y > 2);
        let ring = traced(&mask);
        let tolerance = 1.5;
        let simplified = DouglasPeuckerSimplifier.simplify(&ring, tolerance).unwrap();

        for &p in &ring {
            let nearest = (0..simplified.len())
                .map(|i| segment_distance(p, simplified[i], simplified[(i + 1) % simplified.len()]))
                .fold(f64::INFINITY, f64::min);
            assert!(nearest <= tolerance + 1e-9, "{p:?} is {nearest} away");
        }
    }
}
