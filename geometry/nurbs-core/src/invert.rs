//! Point inversion: mapping a spatial point back to parametric coordinates.
//!
//! There is no closed-form inverse for general rational geometry, so this is
//! a three-stage numerical pipeline: a coarse grid search for a globally
//! sane seed, Newton-Raphson for fast local convergence, and a bounded
//! minimization fallback for the pathological remainder (seams, poles,
//! self-overlapping control nets). Inversion never fails: it always returns
//! the best parameters found together with the residual distance, leaving
//! tolerance policy to the caller.

use crate::curve::NurbsCurve;
use crate::decompose::SplitDirection;
use crate::surface::NurbsSurface;
use nalgebra::{Matrix2, Point, Point3, Vector2};
use tracing::{debug, trace};

/// Residual distance below which a parameter is accepted as exact.
const DISTANCE_TOL: f64 = 1e-7;

/// Zero-cosine tolerance: the angle criterion for a stationary point of the
/// distance function.
const COSINE_TOL: f64 = 1e-8;

/// Iteration cap for the Newton stage.
const MAX_NEWTON_ITERATIONS: usize = 50;

/// Residual at which the grid refinement stops shrinking its window.
const GRID_REFINEMENT_TOL: f64 = 5e-5;

/// Result of inverting a point against a curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveProjection {
    /// Parameter of the closest point found.
    pub u: f64,
    /// Distance from the query point to the curve at `u`.
    pub distance: f64,
}

/// Result of inverting a point against a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProjection {
    /// u-parameter of the closest point found.
    pub u: f64,
    /// v-parameter of the closest point found.
    pub v: f64,
    /// Distance from the query point to the surface at `(u, v)`.
    pub distance: f64,
}

/// Wrap a parameter into a periodic domain, then clamp.
fn wrap_param(x: f64, min: f64, max: f64, closed: bool) -> f64 {
    if closed {
        let period = max - min;
        if x < min {
            return (x + period).clamp(min, max);
        }
        if x > max {
            return (x - period).clamp(min, max);
        }
    }
    x.clamp(min, max)
}

/// Whether `point` lies inside the box `[min, max]` inflated by `margin` on
/// every side.
fn box_contains<const D: usize>(
    min: &Point<f64, D>,
    max: &Point<f64, D>,
    point: &Point<f64, D>,
    margin: f64,
) -> bool {
    (0..D).all(|d| point[d] >= min[d] - margin && point[d] <= max[d] + margin)
}

impl<const D: usize> NurbsCurve<D> {
    /// Find the parameter of the closest point on the curve to `point`.
    ///
    /// Grid search seeds a damped 1-D Newton iteration on the orthogonality
    /// condition `C'(u) · (C(u) − P) = 0`; when Newton aborts, golden-section
    /// refinement over the best grid windows and over every Bezier segment
    /// whose inflated bounding box contains the point picks up the slack.
    #[must_use]
    pub fn closest_parameter(&self, point: &Point<f64, D>) -> CurveProjection {
        let (min, max) = self.domain();
        let closed = self.is_closed();

        // Stage 1: uniform grid
        let samples = 100;
        let step = (max - min) / samples as f64;
        let mut grid: Vec<(f64, f64)> = (0..=samples)
            .map(|i| {
                let u = min + step * i as f64;
                (u, (self.point_at(u) - point).norm())
            })
            .collect();
        grid.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut best = CurveProjection {
            u: grid[0].0,
            distance: grid[0].1,
        };
        debug!(u = best.u, distance = best.distance, "curve inversion grid seed");
        if best.distance <= DISTANCE_TOL {
            return best;
        }

        // Stage 2: Newton from the grid seed
        if let Some(refined) = self.newton_curve(point, best.u, min, max, closed) {
            debug!(u = refined.u, distance = refined.distance, "newton converged");
            if refined.distance <= best.distance || refined.distance <= DISTANCE_TOL {
                return refined;
            }
        }

        // Stage 3: golden-section refinement from the top grid windows and
        // from Bezier segments whose bounding box can contain the point
        for &(u, _) in grid.iter().take(3) {
            let lo = wrap_param(u - step, min, max, false);
            let hi = wrap_param(u + step, min, max, false);
            let candidate = self.golden_section(point, lo, hi);
            if candidate.distance < best.distance {
                best = candidate;
            }
        }

        for segment in self.decompose() {
            let (bb_min, bb_max) = segment.bounding_box();
            if box_contains(&bb_min, &bb_max, point, best.distance) {
                let candidate = self.golden_section(point, segment.range.0, segment.range.1);
                if candidate.distance < best.distance {
                    best = candidate;
                }
            }
        }

        debug!(u = best.u, distance = best.distance, "curve inversion complete");
        best
    }

    /// Newton iteration on `f(u) = C'(u) · (C(u) − P)`.
    ///
    /// Returns `None` on a degenerate tangent, a vanishing second-order
    /// coefficient, step stagnation, or the iteration cap, deferring to the
    /// minimization stage.
    fn newton_curve(
        &self,
        point: &Point<f64, D>,
        seed: f64,
        min: f64,
        max: f64,
        closed: bool,
    ) -> Option<CurveProjection> {
        let mut u = seed;
        for iteration in 0..MAX_NEWTON_ITERATIONS {
            let ders = self.derivatives(u, 2);
            let residual = ders[0] - point.coords;
            let distance = residual.norm();
            if distance <= DISTANCE_TOL {
                return Some(CurveProjection { u, distance });
            }

            let tangent = ders[1];
            let tangent_norm = tangent.norm();
            if tangent_norm < 1e-15 {
                debug!(u, iteration, "zero-length tangent, aborting newton");
                return None;
            }

            let f = tangent.dot(&residual);
            if f.abs() / (tangent_norm * distance) <= COSINE_TOL {
                return Some(CurveProjection { u, distance });
            }

            let fprime = ders[2].dot(&residual) + tangent_norm * tangent_norm;
            if fprime.abs() < 1e-15 {
                debug!(u, iteration, "flat objective, aborting newton");
                return None;
            }

            let next = wrap_param(u - f / fprime, min, max, closed);
            trace!(u, next, distance, iteration, "newton step");
            if ((next - u) * tangent_norm).abs() <= DISTANCE_TOL {
                return None;
            }
            u = next;
        }
        debug!(u, "newton iteration cap reached");
        None
    }

    /// Golden-section search for the distance minimum over `[a, b]`.
    fn golden_section(&self, point: &Point<f64, D>, mut a: f64, mut b: f64) -> CurveProjection {
        const INV_PHI: f64 = 0.618_033_988_749_894_9;

        while b - a > 1e-10 {
            let c = b - (b - a) * INV_PHI;
            let d = a + (b - a) * INV_PHI;
            if (self.point_at(c) - point).norm() < (self.point_at(d) - point).norm() {
                b = d;
            } else {
                a = c;
            }
        }
        let u = 0.5 * (a + b);
        CurveProjection {
            u,
            distance: (self.point_at(u) - point).norm(),
        }
    }
}

impl NurbsSurface {
    /// Find the parameters of the closest point on the surface to `point`.
    ///
    /// Ratio-adapted grid search with shrinking-window refinement seeds a
    /// 2×2 Newton iteration on the two orthogonality conditions; a singular
    /// Jacobian or degenerate partial aborts straight to a projected
    /// gradient descent run from multiple seeds (grid result, seam
    /// projections on closed directions, Bezier patches whose bounding box
    /// can contain the point). The best residual wins.
    #[must_use]
    pub fn closest_parameters(&self, point: &Point3<f64>) -> SurfaceProjection {
        // Stage 1
        let mut best = self.grid_search(point);
        debug!(
            u = best.u,
            v = best.v,
            distance = best.distance,
            "surface inversion grid seed"
        );
        if best.distance <= DISTANCE_TOL {
            return best;
        }

        // Stage 2
        match self.newton_surface(point, best.u, best.v) {
            Some(refined) => {
                debug!(
                    u = refined.u,
                    v = refined.v,
                    distance = refined.distance,
                    "newton converged"
                );
                if refined.distance <= DISTANCE_TOL {
                    return refined;
                }
                if refined.distance < best.distance {
                    best = refined;
                }
            }
            None => debug!("newton aborted, engaging minimization fallback"),
        }

        // Stage 3
        let mut seeds = vec![(best.u, best.v)];
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();
        if self.is_closed_u() {
            seeds.push((u_min, best.v));
            seeds.push((u_max, best.v));
        }
        if self.is_closed_v() {
            seeds.push((best.u, v_min));
            seeds.push((best.u, v_max));
        }
        for patch in self.decompose(SplitDirection::Both) {
            let (bb_min, bb_max) = patch.bounding_box();
            if !box_contains(&bb_min, &bb_max, point, best.distance) {
                continue;
            }
            let mut patch_best: Option<(f64, f64, f64)> = None;
            for i in 0..=4 {
                for j in 0..=4 {
                    let u = patch.range_u.0 + (patch.range_u.1 - patch.range_u.0) * i as f64 / 4.0;
                    let v = patch.range_v.0 + (patch.range_v.1 - patch.range_v.0) * j as f64 / 4.0;
                    let d = (self.point_at(u, v) - point).norm();
                    if patch_best.map_or(true, |(_, _, pd)| d < pd) {
                        patch_best = Some((u, v, d));
                    }
                }
            }
            if let Some((u, v, _)) = patch_best {
                seeds.push((u, v));
            }
        }

        for (u, v) in seeds {
            let candidate = self.descend(point, u, v);
            trace!(
                u = candidate.u,
                v = candidate.v,
                distance = candidate.distance,
                "fallback seed refined"
            );
            if candidate.distance < best.distance {
                best = candidate;
            }
        }

        debug!(
            u = best.u,
            v = best.v,
            distance = best.distance,
            "surface inversion complete"
        );
        best
    }

    /// Coarse grid scan with shrinking-window refinement.
    ///
    /// Per-direction sample counts follow the control-point counts so a
    /// direction with many more control points gets proportionally more
    /// samples. The window halves around the incumbent until the residual
    /// stops improving, the window collapses, or the refinement tolerance is
    /// met.
    fn grid_search(&self, point: &Point3<f64>) -> SurfaceProjection {
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();

        let samples_u = (2 * self.size_u()).clamp(8, 48);
        let samples_v = (2 * self.size_v()).clamp(8, 48);

        let mut best = SurfaceProjection {
            u: u_min,
            v: v_min,
            distance: f64::INFINITY,
        };
        self.scan_window(
            point, u_min, u_max, v_min, v_max, samples_u, samples_v, &mut best,
        );

        let mut window_u = (u_max - u_min) * 0.5;
        let mut window_v = (v_max - v_min) * 0.5;
        for _ in 0..24 {
            if best.distance <= GRID_REFINEMENT_TOL {
                break;
            }
            if window_u < 1e-12 && window_v < 1e-12 {
                break;
            }
            let u_lo = (best.u - window_u).max(u_min);
            let u_hi = (best.u + window_u).min(u_max);
            let v_lo = (best.v - window_v).max(v_min);
            let v_hi = (best.v + window_v).min(v_max);
            if !self.scan_window(point, u_lo, u_hi, v_lo, v_hi, 8, 8, &mut best) {
                break;
            }
            window_u *= 0.5;
            window_v *= 0.5;
        }
        best
    }

    /// Scan a rectangular window at fixed density, updating `best` in place.
    /// Returns whether any sample improved on the incumbent.
    #[allow(clippy::too_many_arguments)]
    fn scan_window(
        &self,
        point: &Point3<f64>,
        u_lo: f64,
        u_hi: f64,
        v_lo: f64,
        v_hi: f64,
        samples_u: usize,
        samples_v: usize,
        best: &mut SurfaceProjection,
    ) -> bool {
        let mut improved = false;
        for i in 0..=samples_u {
            let u = u_lo + (u_hi - u_lo) * i as f64 / samples_u as f64;
            for j in 0..=samples_v {
                let v = v_lo + (v_hi - v_lo) * j as f64 / samples_v as f64;
                let distance = (self.point_at(u, v) - point).norm();
                if distance < best.distance {
                    *best = SurfaceProjection { u, v, distance };
                    improved = true;
                }
            }
        }
        improved
    }

    /// 2×2 Newton iteration on `S_u · r = 0`, `S_v · r = 0` with an LU solve
    /// per step.
    ///
    /// Returns `None` on a singular Jacobian, a zero-length partial, step
    /// stagnation, or the iteration cap; the caller falls through to the
    /// minimization stage instead of trusting a stale estimate.
    fn newton_surface(&self, point: &Point3<f64>, mut u: f64, mut v: f64) -> Option<SurfaceProjection> {
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();
        let closed_u = self.is_closed_u();
        let closed_v = self.is_closed_v();

        for iteration in 0..MAX_NEWTON_ITERATIONS {
            let ders = self.derivatives(u, v, 2);
            let residual = ders[0][0] - point.coords;
            let distance = residual.norm();
            if distance <= DISTANCE_TOL {
                return Some(SurfaceProjection { u, v, distance });
            }

            let su = ders[1][0];
            let sv = ders[0][1];
            let su_norm = su.norm();
            let sv_norm = sv.norm();
            if su_norm < 1e-15 || sv_norm < 1e-15 {
                debug!(u, v, iteration, "degenerate partial, aborting newton");
                return None;
            }

            let f = su.dot(&residual);
            let g = sv.dot(&residual);
            if f.abs() / (su_norm * distance) <= COSINE_TOL
                && g.abs() / (sv_norm * distance) <= COSINE_TOL
            {
                return Some(SurfaceProjection { u, v, distance });
            }

            let jacobian = Matrix2::new(
                su_norm * su_norm + residual.dot(&ders[2][0]),
                su.dot(&sv) + residual.dot(&ders[1][1]),
                su.dot(&sv) + residual.dot(&ders[1][1]),
                sv_norm * sv_norm + residual.dot(&ders[0][2]),
            );
            let delta = match jacobian.lu().solve(&Vector2::new(-f, -g)) {
                Some(delta) => delta,
                None => {
                    debug!(u, v, iteration, "singular jacobian, aborting newton");
                    return None;
                }
            };

            let next_u = wrap_param(u + delta.x, u_min, u_max, closed_u);
            let next_v = wrap_param(v + delta.y, v_min, v_max, closed_v);
            trace!(u, v, next_u, next_v, distance, iteration, "newton step");

            // Stagnation: the step moves the surface point by less than the
            // distance tolerance
            if ((next_u - u) * su + (next_v - v) * sv).norm() <= DISTANCE_TOL {
                return None;
            }
            u = next_u;
            v = next_v;
        }
        debug!(u, v, "newton iteration cap reached");
        None
    }

    /// Projected gradient descent on the squared distance, with backtracking
    /// line search and domain clamping.
    fn descend(&self, point: &Point3<f64>, mut u: f64, mut v: f64) -> SurfaceProjection {
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();
        let extent = (u_max - u_min).max(v_max - v_min);

        let objective = |u: f64, v: f64| (self.point_at(u, v) - point).norm_squared();
        let mut value = objective(u, v);

        for _ in 0..60 {
            let ders = self.derivatives(u, v, 1);
            let residual = ders[0][0] - point.coords;
            let grad_u = 2.0 * ders[1][0].dot(&residual);
            let grad_v = 2.0 * ders[0][1].dot(&residual);
            let grad_norm = grad_u.hypot(grad_v);
            if grad_norm < 1e-14 {
                break;
            }

            // First trial moves a quarter of the domain extent
            let mut step = 0.25 * extent / grad_norm;
            let mut improved = false;
            while step * grad_norm > 1e-14 {
                let cu = (u - step * grad_u).clamp(u_min, u_max);
                let cv = (v - step * grad_v).clamp(v_min, v_max);
                let candidate = objective(cu, cv);
                if candidate < value - 1e-4 * step * grad_norm * grad_norm {
                    u = cu;
                    v = cv;
                    value = candidate;
                    improved = true;
                    break;
                }
                step *= 0.5;
            }
            if !improved {
                break;
            }
        }

        SurfaceProjection {
            u,
            v,
            distance: value.sqrt(),
        }
    }
}
