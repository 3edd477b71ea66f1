//! Bezier decomposition.
//!
//! Repeated splitting at every distinct interior knot reduces a curve to
//! Bezier segments (single-span pieces with `degree + 1` control points) and
//! a surface to a grid of Bezier patches. Each piece keeps the original
//! parameter interval it covers, so the ranges tile the domain exactly.

use crate::curve::NurbsCurve;
use crate::knots;
use crate::surface::NurbsSurface;
use nalgebra::Point;

/// One Bezier piece of a decomposed curve.
#[derive(Debug, Clone)]
pub struct BezierSegment<const D: usize> {
    /// The segment as a stand-alone curve.
    pub curve: NurbsCurve<D>,
    /// The interval of the original parameter space this segment covers.
    pub range: (f64, f64),
}

impl<const D: usize> BezierSegment<D> {
    /// Axis-aligned bounding box of the control points.
    ///
    /// By the convex-hull property the segment lies inside this box, which
    /// makes it a cheap containment filter for inversion seeding.
    #[must_use]
    pub fn bounding_box(&self) -> (Point<f64, D>, Point<f64, D>) {
        bounding_box(self.curve.control_points())
    }
}

/// One Bezier piece of a decomposed surface.
#[derive(Debug, Clone)]
pub struct BezierPatch {
    /// The patch as a stand-alone surface.
    pub surface: NurbsSurface,
    /// The u-interval of the original parameter space this patch covers.
    pub range_u: (f64, f64),
    /// The v-interval of the original parameter space this patch covers.
    pub range_v: (f64, f64),
}

impl BezierPatch {
    /// Axis-aligned bounding box of the control grid.
    #[must_use]
    pub fn bounding_box(&self) -> (Point<f64, 3>, Point<f64, 3>) {
        bounding_box(self.surface.control_points())
    }
}

fn bounding_box<const D: usize>(points: &[Point<f64, D>]) -> (Point<f64, D>, Point<f64, D>) {
    let mut min = points[0];
    let mut max = points[0];
    for p in &points[1..] {
        for d in 0..D {
            min[d] = min[d].min(p[d]);
            max[d] = max[d].max(p[d]);
        }
    }
    (min, max)
}

/// Which parameter direction(s) to decompose a surface along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// Split at every distinct interior u-knot; pieces span the full v-domain.
    U,
    /// Split at every distinct interior v-knot; pieces span the full u-domain.
    V,
    /// Split in both directions, yielding true Bezier patches.
    Both,
}

/// Lazy iterator over the Bezier segments of a curve, in parameter order.
///
/// Splits off the leading segment on each step; the final remainder is
/// yielded last. The number of segments is the number of distinct interior
/// knots plus one.
pub struct CurveDecomposition<const D: usize> {
    remainder: Option<NurbsCurve<D>>,
    splits: std::vec::IntoIter<f64>,
}

impl<const D: usize> Iterator for CurveDecomposition<D> {
    type Item = BezierSegment<D>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.remainder.take()?;
        if let Some(u) = self.splits.next() {
            if let Ok((left, right)) = current.split(u) {
                self.remainder = Some(right);
                let range = left.domain();
                return Some(BezierSegment { curve: left, range });
            }
        }
        let range = current.domain();
        Some(BezierSegment { curve: current, range })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl<const D: usize> ExactSizeIterator for CurveDecomposition<D> {
    fn len(&self) -> usize {
        if self.remainder.is_some() {
            self.splits.len() + 1
        } else {
            0
        }
    }
}

impl<const D: usize> NurbsCurve<D> {
    /// Decompose the curve into Bezier segments.
    ///
    /// A curve with no interior knots yields itself as the single segment.
    #[must_use]
    pub fn decompose(&self) -> CurveDecomposition<D> {
        let splits = knots::interior_knots(self.degree(), self.knots());
        CurveDecomposition {
            remainder: Some(self.clone()),
            splits: splits.into_iter(),
        }
    }
}

impl NurbsSurface {
    /// Decompose the surface along `direction`.
    ///
    /// With [`SplitDirection::Both`] the result is a row-major grid of
    /// Bezier patches (u-strips first, each subdivided in v); with a single
    /// direction the pieces are Bezier in that direction only and span the
    /// other domain in full.
    #[must_use]
    pub fn decompose(&self, direction: SplitDirection) -> Vec<BezierPatch> {
        let u_strips = match direction {
            SplitDirection::V => vec![self.clone()],
            SplitDirection::U | SplitDirection::Both => strips_u(self),
        };

        let mut patches = Vec::new();
        for strip in u_strips {
            match direction {
                SplitDirection::U => patches.push(into_patch(strip)),
                SplitDirection::V | SplitDirection::Both => {
                    patches.extend(strips_v(&strip).into_iter().map(into_patch));
                }
            }
        }
        patches
    }
}

fn into_patch(surface: NurbsSurface) -> BezierPatch {
    let range_u = surface.domain_u();
    let range_v = surface.domain_v();
    BezierPatch {
        surface,
        range_u,
        range_v,
    }
}

fn strips_u(surface: &NurbsSurface) -> Vec<NurbsSurface> {
    let mut strips = Vec::new();
    let mut rest = surface.clone();
    for u in knots::interior_knots(surface.degree_u(), surface.knots_u()) {
        if let Ok((left, right)) = rest.split_u(u) {
            strips.push(left);
            rest = right;
        }
    }
    strips.push(rest);
    strips
}

fn strips_v(surface: &NurbsSurface) -> Vec<NurbsSurface> {
    let mut strips = Vec::new();
    let mut rest = surface.clone();
    for v in knots::interior_knots(surface.degree_v(), surface.knots_v()) {
        if let Ok((left, right)) = rest.split_v(v) {
            strips.push(left);
            rest = right;
        }
    }
    strips.push(rest);
    strips
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::NurbsCurve3;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn wiggle() -> NurbsCurve3 {
        NurbsCurve3::clamped(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 2.0, 1.0),
                Point3::new(3.0, 2.0, -1.0),
                Point3::new(4.0, 0.0, 0.0),
                Point3::new(5.0, -1.0, 2.0),
                Point3::new(6.0, 1.0, 0.0),
            ],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_segment_count_and_ranges_tile_domain() {
        let curve = wiggle();
        let interior = knots::interior_knots(curve.degree(), curve.knots());
        let segments: Vec<_> = curve.decompose().collect();

        assert_eq!(segments.len(), interior.len() + 1);
        assert_eq!(curve.decompose().len(), segments.len());

        assert_relative_eq!(segments[0].range.0, curve.domain().0);
        assert_relative_eq!(segments.last().unwrap().range.1, curve.domain().1);
        for pair in segments.windows(2) {
            assert_relative_eq!(pair[0].range.1, pair[1].range.0);
        }
    }

    #[test]
    fn test_segments_are_bezier() {
        for segment in wiggle().decompose() {
            assert_eq!(segment.curve.num_control_points(), 4);
            assert!(knots::interior_knots(3, segment.curve.knots()).is_empty());
        }
    }

    #[test]
    fn test_segments_match_original() {
        let curve = wiggle();
        for segment in curve.decompose() {
            let (a, b) = segment.range;
            for i in 0..=20 {
                let u = a + (b - a) * i as f64 / 20.0;
                assert_relative_eq!(
                    segment.curve.point_at(u).coords,
                    curve.point_at(u).coords,
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_single_span_curve_yields_itself() {
        let bezier = NurbsCurve3::clamped(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            2,
        )
        .unwrap();
        let segments: Vec<_> = bezier.decompose().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].range, bezier.domain());
        assert_eq!(segments[0].curve, bezier);
    }

    #[test]
    fn test_bounding_box_contains_samples() {
        let curve = wiggle();
        for segment in curve.decompose() {
            let (min, max) = segment.bounding_box();
            for i in 0..=10 {
                let u = segment.range.0 + (segment.range.1 - segment.range.0) * i as f64 / 10.0;
                let p = segment.curve.point_at(u);
                for d in 0..3 {
                    assert!(p[d] >= min[d] - 1e-12 && p[d] <= max[d] + 1e-12);
                }
            }
        }
    }

    fn saddle() -> NurbsSurface {
        let grid: Vec<Vec<Point3<f64>>> = (0..5)
            .map(|i| {
                (0..5)
                    .map(|j| {
                        let x = i as f64 / 4.0;
                        let y = j as f64 / 4.0;
                        Point3::new(x, y, (x - 0.5) * (y - 0.5))
                    })
                    .collect()
            })
            .collect();
        NurbsSurface::clamped(grid, 3, 3).unwrap()
    }

    #[test]
    fn test_surface_patch_count() {
        let surface = saddle();
        // One interior knot per direction: 2x2 patches for Both, 2 strips
        // for a single direction
        assert_eq!(surface.decompose(SplitDirection::Both).len(), 4);
        assert_eq!(surface.decompose(SplitDirection::U).len(), 2);
        assert_eq!(surface.decompose(SplitDirection::V).len(), 2);
    }

    #[test]
    fn test_surface_patches_match_original() {
        let surface = saddle();
        for patch in surface.decompose(SplitDirection::Both) {
            assert_eq!(patch.surface.size_u(), 4);
            assert_eq!(patch.surface.size_v(), 4);
            for i in 0..=5 {
                for j in 0..=5 {
                    let u = patch.range_u.0 + (patch.range_u.1 - patch.range_u.0) * i as f64 / 5.0;
                    let v = patch.range_v.0 + (patch.range_v.1 - patch.range_v.0) * j as f64 / 5.0;
                    assert_relative_eq!(
                        patch.surface.point_at(u, v).coords,
                        surface.point_at(u, v).coords,
                        epsilon = 1e-10
                    );
                }
            }
        }
    }

    #[test]
    fn test_single_direction_strips_span_other_domain() {
        let surface = saddle();
        for patch in surface.decompose(SplitDirection::U) {
            assert_eq!(patch.range_v, surface.domain_v());
        }
        for patch in surface.decompose(SplitDirection::V) {
            assert_eq!(patch.range_u, surface.domain_u());
        }
    }
}
