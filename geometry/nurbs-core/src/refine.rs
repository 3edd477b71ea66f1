//! Knot refinement: Boehm insertion and parameter-space splitting.
//!
//! Insertion rewrites a curve or surface over a larger knot vector without
//! moving a single point of the evaluated geometry. Splitting is insertion
//! driven to full multiplicity, after which the control net separates into
//! two independent pieces. Both pieces keep the original parameterization:
//! splitting at `u` yields domains `[start, u]` and `[u, end]`, not a
//! renormalized `[0, 1]`.

use crate::curve::{Homogeneous, NurbsCurve};
use crate::knots::{find_multiplicity, find_span, KNOT_TOLERANCE};
use crate::surface::NurbsSurface;
use crate::{KernelError, Result};
use hashbrown::HashMap;

/// Interpolation coefficients for one insertion, memoized per `(i, leg)`.
///
/// The coefficients depend only on the knot vector, the span, and the
/// inserted parameter, so a surface insertion reuses one cache across every
/// strand of the control grid.
pub(crate) struct AlphaCache<'a> {
    knots: &'a [f64],
    u: f64,
    span: usize,
    cache: HashMap<(usize, usize), f64>,
}

impl<'a> AlphaCache<'a> {
    pub(crate) fn new(knots: &'a [f64], u: f64, span: usize) -> Self {
        Self {
            knots,
            u,
            span,
            cache: HashMap::new(),
        }
    }

    /// `(u - U[leg + i]) / (U[i + span + 1] - U[leg + i])`, clamped to zero
    /// when the knot difference vanishes.
    pub(crate) fn alpha(&mut self, i: usize, leg: usize) -> f64 {
        let (knots, u, span) = (self.knots, self.u, self.span);
        *self.cache.entry((i, leg)).or_insert_with(|| {
            let denom = knots[i + span + 1] - knots[leg + i];
            if denom.abs() > 1e-15 {
                (u - knots[leg + i]) / denom
            } else {
                0.0
            }
        })
    }
}

/// Knot vector after inserting `u` `num` times at `span`.
pub(crate) fn inserted_knot_vector(knots: &[f64], span: usize, u: f64, num: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(knots.len() + num);
    out.extend_from_slice(&knots[..=span]);
    out.extend(std::iter::repeat(u).take(num));
    out.extend_from_slice(&knots[span + 1..]);
    out
}

/// Insert a knot `num` times into one homogeneous control strand.
///
/// `s` is the existing multiplicity of the knot, `span` its span index.
/// Callers guarantee `s + num <= degree`. Points outside the affected window
/// `[span - degree, span - s]` are copied through unchanged; the window
/// itself is re-derived by repeated convex combination.
pub(crate) fn insert_strand<const D: usize>(
    degree: usize,
    points: &[Homogeneous<D>],
    num: usize,
    s: usize,
    span: usize,
    alphas: &mut AlphaCache<'_>,
) -> Vec<Homogeneous<D>> {
    let n = points.len();
    let mut q = vec![Homogeneous::zero(); n + num];

    for i in 0..=span - degree {
        q[i] = points[i];
    }
    for i in (span - s)..n {
        q[i + num] = points[i];
    }

    let mut temp: Vec<Homogeneous<D>> = points[span - degree..=span - s].to_vec();
    for j in 1..=num {
        let leg = span - degree + j;
        for i in 0..=(degree - j - s) {
            let alpha = alphas.alpha(i, leg);
            temp[i] = Homogeneous::lerp(&temp[i], &temp[i + 1], alpha);
        }
        q[leg] = temp[0];
        q[span + num - j - s] = temp[degree - j - s];
    }

    // Remaining interior points come from the last triangle row
    let leg = span - degree + num;
    for i in (leg + 1)..(span - s) {
        q[i] = temp[i - leg];
    }

    q
}

/// Grid, u-size, and u-knot vector after inserting `u` `num` times in the
/// u-direction. No validation; callers have checked domain and multiplicity.
pub(crate) fn inserted_grid_u(
    surface: &NurbsSurface,
    u: f64,
    num: usize,
) -> (Vec<Homogeneous<3>>, usize, Vec<f64>) {
    let degree = surface.degree_u();
    let (size_u, size_v) = (surface.size_u(), surface.size_v());
    if num == 0 {
        return (surface.homogeneous(), size_u, surface.knots_u().to_vec());
    }
    let s = find_multiplicity(u, surface.knots_u());
    let span = find_span(degree, surface.knots_u(), size_u, u);

    let points = surface.homogeneous();
    let new_size_u = size_u + num;
    let mut grid = vec![Homogeneous::zero(); new_size_u * size_v];
    let mut alphas = AlphaCache::new(surface.knots_u(), u, span);

    for j in 0..size_v {
        let strand: Vec<Homogeneous<3>> =
            (0..size_u).map(|i| points[i * size_v + j]).collect();
        let refined = insert_strand(degree, &strand, num, s, span, &mut alphas);
        for (i, point) in refined.into_iter().enumerate() {
            grid[i * size_v + j] = point;
        }
    }

    let knots = inserted_knot_vector(surface.knots_u(), span, u, num);
    (grid, new_size_u, knots)
}

/// Grid, v-size, and v-knot vector after inserting `v` `num` times in the
/// v-direction.
pub(crate) fn inserted_grid_v(
    surface: &NurbsSurface,
    v: f64,
    num: usize,
) -> (Vec<Homogeneous<3>>, usize, Vec<f64>) {
    let degree = surface.degree_v();
    let (size_u, size_v) = (surface.size_u(), surface.size_v());
    if num == 0 {
        return (surface.homogeneous(), size_v, surface.knots_v().to_vec());
    }
    let s = find_multiplicity(v, surface.knots_v());
    let span = find_span(degree, surface.knots_v(), size_v, v);

    let points = surface.homogeneous();
    let new_size_v = size_v + num;
    let mut grid = vec![Homogeneous::zero(); size_u * new_size_v];
    let mut alphas = AlphaCache::new(surface.knots_v(), v, span);

    for i in 0..size_u {
        let strand = &points[i * size_v..(i + 1) * size_v];
        let refined = insert_strand(degree, strand, num, s, span, &mut alphas);
        grid[i * new_size_v..(i + 1) * new_size_v].copy_from_slice(&refined);
    }

    let knots = inserted_knot_vector(surface.knots_v(), span, v, num);
    (grid, new_size_v, knots)
}

/// Partition a fully-refined knot vector at `u`.
///
/// `ks` is one past the last occurrence of `u`; the left vector gains one
/// closing copy of `u`, the right vector a full `degree + 1` opening run.
fn split_knot_vectors(degree: usize, knots: &[f64], ks: usize, u: f64) -> (Vec<f64>, Vec<f64>) {
    let mut left = Vec::with_capacity(ks + 1);
    left.extend_from_slice(&knots[..ks]);
    left.push(u);

    let mut right = Vec::with_capacity(degree + 1 + knots.len() - ks);
    right.extend(std::iter::repeat(u).take(degree + 1));
    right.extend_from_slice(&knots[ks..]);

    (left, right)
}

// Within knot tolerance of an end the split knot would coincide with the
// clamped boundary run, so such parameters count as boundary too.
fn require_interior(u: f64, min: f64, max: f64) -> Result<()> {
    if u - min <= KNOT_TOLERANCE || max - u <= KNOT_TOLERANCE {
        return Err(KernelError::out_of_domain(u, min, max));
    }
    Ok(())
}

impl<const D: usize> NurbsCurve<D> {
    /// Insert the knot `u` `num` times without changing the curve's shape.
    ///
    /// Each insertion adds one control point and one knot. Inserting zero
    /// times returns an unchanged copy.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ParameterOutOfDomain`] if `u` is outside the
    /// domain and [`KernelError::InsertionExceedsDegree`] if the resulting
    /// multiplicity would exceed the degree.
    pub fn insert_knot(&self, u: f64, num: usize) -> Result<Self> {
        let (min, max) = self.domain();
        if u < min || u > max {
            return Err(KernelError::out_of_domain(u, min, max));
        }

        let s = find_multiplicity(u, self.knots());
        let allowed = self.degree().saturating_sub(s);
        if num > allowed {
            return Err(KernelError::InsertionExceedsDegree {
                requested: num,
                allowed,
            });
        }
        if num == 0 {
            return Ok(self.clone());
        }

        let span = find_span(self.degree(), self.knots(), self.num_control_points(), u);
        let mut alphas = AlphaCache::new(self.knots(), u, span);
        let points = insert_strand(self.degree(), &self.homogeneous(), num, s, span, &mut alphas);
        let knots = inserted_knot_vector(self.knots(), span, u, num);

        Ok(Self::from_homogeneous(
            points,
            knots,
            self.degree(),
            self.is_rational(),
        ))
    }

    /// Split the curve at `u` into two curves that keep the original
    /// parameterization: the left piece over `[start, u]`, the right over
    /// `[u, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ParameterOutOfDomain`] unless `u` is strictly
    /// inside the domain.
    pub fn split(&self, u: f64) -> Result<(Self, Self)> {
        let (min, max) = self.domain();
        require_interior(u, min, max)?;

        let p = self.degree();
        let s = find_multiplicity(u, self.knots());
        let span = find_span(p, self.knots(), self.num_control_points(), u);
        let count = p.saturating_sub(s);
        let first = span - p + 1;

        let (knots, points) = if count > 0 {
            let mut alphas = AlphaCache::new(self.knots(), u, span);
            (
                inserted_knot_vector(self.knots(), span, u, count),
                insert_strand(p, &self.homogeneous(), count, s, span, &mut alphas),
            )
        } else {
            (self.knots().to_vec(), self.homogeneous())
        };

        let ks = find_span(p, &knots, points.len(), u) + 1;
        let (left_knots, right_knots) = split_knot_vectors(p, &knots, ks, u);

        let left = Self::from_homogeneous(
            points[..first + count].to_vec(),
            left_knots,
            p,
            self.is_rational(),
        );
        let right = Self::from_homogeneous(
            points[first + count - 1..].to_vec(),
            right_knots,
            p,
            self.is_rational(),
        );
        Ok((left, right))
    }
}

impl NurbsSurface {
    /// Insert the knot `u` `num` times in the u-direction.
    ///
    /// Adds a row of control points per insertion; the surface's shape is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// As [`NurbsCurve::insert_knot`], against the u-domain and u-degree.
    pub fn insert_knot_u(&self, u: f64, num: usize) -> Result<Self> {
        let (min, max) = self.domain_u();
        if u < min || u > max {
            return Err(KernelError::out_of_domain(u, min, max));
        }

        let s = find_multiplicity(u, self.knots_u());
        let allowed = self.degree_u().saturating_sub(s);
        if num > allowed {
            return Err(KernelError::InsertionExceedsDegree {
                requested: num,
                allowed,
            });
        }
        if num == 0 {
            return Ok(self.clone());
        }

        let (grid, new_size_u, knots_u) = inserted_grid_u(self, u, num);
        Ok(Self::from_homogeneous(
            grid,
            new_size_u,
            self.size_v(),
            knots_u,
            self.knots_v().to_vec(),
            self.degree_u(),
            self.degree_v(),
            self.is_rational(),
        ))
    }

    /// Insert the knot `v` `num` times in the v-direction.
    ///
    /// # Errors
    ///
    /// As [`NurbsCurve::insert_knot`], against the v-domain and v-degree.
    pub fn insert_knot_v(&self, v: f64, num: usize) -> Result<Self> {
        let (min, max) = self.domain_v();
        if v < min || v > max {
            return Err(KernelError::out_of_domain(v, min, max));
        }

        let s = find_multiplicity(v, self.knots_v());
        let allowed = self.degree_v().saturating_sub(s);
        if num > allowed {
            return Err(KernelError::InsertionExceedsDegree {
                requested: num,
                allowed,
            });
        }
        if num == 0 {
            return Ok(self.clone());
        }

        let (grid, new_size_v, knots_v) = inserted_grid_v(self, v, num);
        Ok(Self::from_homogeneous(
            grid,
            self.size_u(),
            new_size_v,
            self.knots_u().to_vec(),
            knots_v,
            self.degree_u(),
            self.degree_v(),
            self.is_rational(),
        ))
    }

    /// Split the surface at constant `u` into two surfaces over
    /// `[u_start, u]` and `[u, u_end]`, both spanning the full v-domain.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ParameterOutOfDomain`] unless `u` is strictly
    /// inside the u-domain.
    pub fn split_u(&self, u: f64) -> Result<(Self, Self)> {
        let (min, max) = self.domain_u();
        require_interior(u, min, max)?;

        let p = self.degree_u();
        let s = find_multiplicity(u, self.knots_u());
        let span = find_span(p, self.knots_u(), self.size_u(), u);
        let count = p.saturating_sub(s);
        let first = span - p + 1;

        let (grid, new_size_u, knots) = inserted_grid_u(self, u, count);
        let ks = find_span(p, &knots, new_size_u, u) + 1;
        let (left_knots, right_knots) = split_knot_vectors(p, &knots, ks, u);

        let size_v = self.size_v();
        let left_rows = first + count;
        let left = Self::from_homogeneous(
            grid[..left_rows * size_v].to_vec(),
            left_rows,
            size_v,
            left_knots,
            self.knots_v().to_vec(),
            p,
            self.degree_v(),
            self.is_rational(),
        );
        let right = Self::from_homogeneous(
            grid[(left_rows - 1) * size_v..].to_vec(),
            new_size_u - left_rows + 1,
            size_v,
            right_knots,
            self.knots_v().to_vec(),
            p,
            self.degree_v(),
            self.is_rational(),
        );
        Ok((left, right))
    }

    /// Split the surface at constant `v` into two surfaces over
    /// `[v_start, v]` and `[v, v_end]`, both spanning the full u-domain.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ParameterOutOfDomain`] unless `v` is strictly
    /// inside the v-domain.
    pub fn split_v(&self, v: f64) -> Result<(Self, Self)> {
        let (min, max) = self.domain_v();
        require_interior(v, min, max)?;

        let p = self.degree_v();
        let s = find_multiplicity(v, self.knots_v());
        let span = find_span(p, self.knots_v(), self.size_v(), v);
        let count = p.saturating_sub(s);
        let first = span - p + 1;

        let (grid, new_size_v, knots) = inserted_grid_v(self, v, count);
        let ks = find_span(p, &knots, new_size_v, v) + 1;
        let (left_knots, right_knots) = split_knot_vectors(p, &knots, ks, v);

        let size_u = self.size_u();
        let left_cols = first + count;
        let right_cols = new_size_v - left_cols + 1;

        let mut left_grid = Vec::with_capacity(size_u * left_cols);
        let mut right_grid = Vec::with_capacity(size_u * right_cols);
        for i in 0..size_u {
            let row = &grid[i * new_size_v..(i + 1) * new_size_v];
            left_grid.extend_from_slice(&row[..left_cols]);
            right_grid.extend_from_slice(&row[left_cols - 1..]);
        }

        let left = Self::from_homogeneous(
            left_grid,
            size_u,
            left_cols,
            self.knots_u().to_vec(),
            left_knots,
            self.degree_u(),
            p,
            self.is_rational(),
        );
        let right = Self::from_homogeneous(
            right_grid,
            size_u,
            right_cols,
            self.knots_u().to_vec(),
            right_knots,
            self.degree_u(),
            p,
            self.is_rational(),
        );
        Ok((left, right))
    }
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

    fn quarter_circle() -> NurbsCurve3 {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        NurbsCurve3::rational(
            vec![
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![1.0, w, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            2,
        )
        .unwrap()
    }

    fn saddle() -> NurbsSurface {
        let grid: Vec<Vec<Point3<f64>>> = (0..5)
            .map(|i| {
                (0..4)
                    .map(|j| {
                        let x = i as f64 / 4.0;
                        let y = j as f64 / 3.0;
                        Point3::new(x, y, (x - 0.5) * (y - 0.5))
                    })
                    .collect()
            })
            .collect();
        NurbsSurface::clamped(grid, 3, 3).unwrap()
    }

    #[test]
    fn test_insertion_preserves_shape() {
        let curve = wiggle();
        let refined = curve.insert_knot(0.42, 2).unwrap();

        assert_eq!(refined.num_control_points(), curve.num_control_points() + 2);
        assert_eq!(refined.knots().len(), curve.knots().len() + 2);
        assert_eq!(crate::knots::find_multiplicity(0.42, refined.knots()), 2);

        for i in 0..=100 {
            let u = i as f64 / 100.0;
            assert_relative_eq!(
                refined.point_at(u).coords,
                curve.point_at(u).coords,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_insertion_at_existing_knot() {
        // Interior knots of the clamped wiggle sit at 1/3 and 2/3
        let curve = wiggle();
        let u = curve.knots()[4];
        let refined = curve.insert_knot(u, 2).unwrap();
        assert_eq!(crate::knots::find_multiplicity(u, refined.knots()), 3);

        for i in 0..=50 {
            let t = i as f64 / 50.0;
            assert_relative_eq!(
                refined.point_at(t).coords,
                curve.point_at(t).coords,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_insertion_degree_limit() {
        let curve = wiggle();
        assert!(curve.insert_knot(0.5, 3).is_ok());

        let err = curve.insert_knot(0.5, 4).unwrap_err();
        assert!(err.is_insertion_exceeds_degree());

        // An existing single knot leaves room for only degree - 1 more
        let u = curve.knots()[4];
        let err = curve.insert_knot(u, 3).unwrap_err();
        assert!(matches!(
            err,
            KernelError::InsertionExceedsDegree { requested: 3, allowed: 2 }
        ));

        let err = curve.insert_knot(2.0, 1).unwrap_err();
        assert!(err.is_out_of_domain());
    }

    #[test]
    fn test_rational_insertion_preserves_circle() {
        let arc = quarter_circle();
        let refined = arc.insert_knot(0.3, 2).unwrap();
        assert!(refined.is_rational());

        for i in 0..=40 {
            let u = i as f64 / 40.0;
            assert_relative_eq!(refined.point_at(u).coords.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_split_preserves_shape_and_domains() {
        let curve = wiggle();
        let (left, right) = curve.split(0.37).unwrap();

        assert_relative_eq!(left.domain().0, 0.0);
        assert_relative_eq!(left.domain().1, 0.37);
        assert_relative_eq!(right.domain().0, 0.37);
        assert_relative_eq!(right.domain().1, 1.0);

        for i in 0..=50 {
            let u = 0.37 * i as f64 / 50.0;
            assert_relative_eq!(
                left.point_at(u).coords,
                curve.point_at(u).coords,
                epsilon = 1e-10
            );
        }
        for i in 0..=50 {
            let u = 0.37 + (1.0 - 0.37) * i as f64 / 50.0;
            assert_relative_eq!(
                right.point_at(u).coords,
                curve.point_at(u).coords,
                epsilon = 1e-10
            );
        }

        // The pieces meet exactly at the split point
        assert_relative_eq!(
            left.point_at(0.37).coords,
            right.point_at(0.37).coords,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_split_at_existing_knot() {
        let curve = wiggle();
        let u = curve.knots()[5];
        let (left, right) = curve.split(u).unwrap();
        assert_relative_eq!(left.domain().1, u);
        assert_relative_eq!(right.domain().0, u);
        assert_relative_eq!(
            left.point_at(u).coords,
            curve.point_at(u).coords,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_split_rejects_boundary() {
        let curve = wiggle();
        assert!(curve.split(0.0).unwrap_err().is_out_of_domain());
        assert!(curve.split(1.0).unwrap_err().is_out_of_domain());
        assert!(curve.split(-0.1).unwrap_err().is_out_of_domain());
        // Within knot tolerance of an end counts as boundary
        assert!(curve.split(1e-12).unwrap_err().is_out_of_domain());
    }

    #[test]
    fn test_surface_insertion_preserves_shape() {
        let surface = saddle();
        let in_u = surface.insert_knot_u(0.45, 1).unwrap();
        let in_v = surface.insert_knot_v(0.62, 2).unwrap();

        assert_eq!(in_u.size_u(), surface.size_u() + 1);
        assert_eq!(in_u.size_v(), surface.size_v());
        assert_eq!(in_v.size_v(), surface.size_v() + 2);

        for i in 0..=8 {
            for j in 0..=8 {
                let (u, v) = (i as f64 / 8.0, j as f64 / 8.0);
                let expected = surface.point_at(u, v).coords;
                assert_relative_eq!(in_u.point_at(u, v).coords, expected, epsilon = 1e-12);
                assert_relative_eq!(in_v.point_at(u, v).coords, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_surface_insertion_degree_limit() {
        let surface = saddle();
        let err = surface.insert_knot_u(0.45, 4).unwrap_err();
        assert!(err.is_insertion_exceeds_degree());
        assert!(surface.insert_knot_v(3.0, 1).unwrap_err().is_out_of_domain());
    }

    #[test]
    fn test_surface_split_u_tiles_the_original() {
        let surface = saddle();
        let (bottom, top) = surface.split_u(0.4).unwrap();

        assert_relative_eq!(bottom.domain_u().1, 0.4);
        assert_relative_eq!(top.domain_u().0, 0.4);
        // v-domain is untouched
        assert_relative_eq!(bottom.domain_v().1, 1.0);

        for i in 0..=6 {
            for j in 0..=6 {
                let v = j as f64 / 6.0;
                let u_b = 0.4 * i as f64 / 6.0;
                assert_relative_eq!(
                    bottom.point_at(u_b, v).coords,
                    surface.point_at(u_b, v).coords,
                    epsilon = 1e-10
                );
                let u_t = 0.4 + 0.6 * i as f64 / 6.0;
                assert_relative_eq!(
                    top.point_at(u_t, v).coords,
                    surface.point_at(u_t, v).coords,
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_surface_split_v_tiles_the_original() {
        let surface = saddle();
        let (left, right) = surface.split_v(0.55).unwrap();

        assert_relative_eq!(left.domain_v().1, 0.55);
        assert_relative_eq!(right.domain_v().0, 0.55);

        for i in 0..=6 {
            for j in 0..=6 {
                let u = i as f64 / 6.0;
                let v_l = 0.55 * j as f64 / 6.0;
                assert_relative_eq!(
                    left.point_at(u, v_l).coords,
                    surface.point_at(u, v_l).coords,
                    epsilon = 1e-10
                );
                let v_r = 0.55 + 0.45 * j as f64 / 6.0;
                assert_relative_eq!(
                    right.point_at(u, v_r).coords,
                    surface.point_at(u, v_r).coords,
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_surface_split_rejects_boundary() {
        let surface = saddle();
        assert!(surface.split_u(0.0).unwrap_err().is_out_of_domain());
        assert!(surface.split_v(1.0).unwrap_err().is_out_of_domain());
    }
}
