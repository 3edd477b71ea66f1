//! NURBS surfaces.
//!
//! The bidirectional tensor-product extension of [`NurbsCurve`]: two degrees,
//! two knot vectors, and a row-major control grid. As with curves, one type
//! covers the rational and non-rational cases.

use crate::curve::{Homogeneous, NurbsCurve3};
use crate::knots::{self, find_multiplicity, find_span};
use crate::{basis, refine, KernelError, Result};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A NURBS surface in 3D space.
///
/// The control grid is stored row-major: the point at grid position
/// `(i, j)` (u-index `i`, v-index `j`) lives at `control_points[i * size_v + j]`,
/// so a fixed u-index selects a contiguous v-directed row. Weights, when
/// present, use the same layout.
///
/// The valid parameter rectangle is [`Self::domain_u`] × [`Self::domain_v`].
/// Surfaces are immutable: every kernel operation returns a new surface.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NurbsSurface {
    control_points: Vec<Point3<f64>>,
    knots_u: Vec<f64>,
    knots_v: Vec<f64>,
    degree_u: usize,
    degree_v: usize,
    size_u: usize,
    size_v: usize,
    weights: Option<Vec<f64>>,
}

impl NurbsSurface {
    /// Create a non-rational surface with explicit knot vectors.
    ///
    /// `control_points` is the row-major grid (`size_u * size_v` entries).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidDegree`] if either degree is zero or a
    /// grid direction has fewer than `degree + 1` points, and
    /// [`KernelError::InvalidKnotVector`] on knot or grid-size mismatches.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        control_points: Vec<Point3<f64>>,
        size_u: usize,
        size_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
    ) -> Result<Self> {
        Self::validate(
            &control_points,
            size_u,
            size_v,
            &knots_u,
            &knots_v,
            degree_u,
            degree_v,
            None,
        )?;
        Ok(Self {
            control_points,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
            size_u,
            size_v,
            weights: None,
        })
    }

    /// Create a rational surface with explicit weights (row-major, same
    /// layout as the control grid).
    ///
    /// # Errors
    ///
    /// As [`Self::new`], plus [`KernelError::WeightCountMismatch`] if the
    /// weights don't pair up with the control grid and
    /// [`KernelError::InvalidWeight`] for any non-positive weight.
    #[allow(clippy::too_many_arguments)]
    pub fn rational(
        control_points: Vec<Point3<f64>>,
        weights: Vec<f64>,
        size_u: usize,
        size_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
    ) -> Result<Self> {
        Self::validate(
            &control_points,
            size_u,
            size_v,
            &knots_u,
            &knots_v,
            degree_u,
            degree_v,
            Some(&weights),
        )?;
        Ok(Self {
            control_points,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
            size_u,
            size_v,
            weights: Some(weights),
        })
    }

    /// Create a clamped non-rational surface from a nested grid
    /// (`grid[i][j]` is the point at u-index `i`, v-index `j`) with uniform
    /// interior knots on `[0, 1]` in both directions.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidDegree`] when a direction is too small
    /// for its degree, [`KernelError::InvalidKnotVector`] for a ragged grid.
    pub fn clamped(
        grid: Vec<Vec<Point3<f64>>>,
        degree_u: usize,
        degree_v: usize,
    ) -> Result<Self> {
        let size_u = grid.len();
        let size_v = grid.first().map_or(0, Vec::len);
        if grid.iter().any(|row| row.len() != size_v) {
            return Err(KernelError::invalid_knot_vector(
                "control grid rows must all have the same length",
            ));
        }
        if degree_u == 0 || size_u < degree_u + 1 {
            return Err(KernelError::InvalidDegree {
                degree: degree_u,
                num_ctrlpts: size_u,
            });
        }
        if degree_v == 0 || size_v < degree_v + 1 {
            return Err(KernelError::InvalidDegree {
                degree: degree_v,
                num_ctrlpts: size_v,
            });
        }

        let control_points = grid.into_iter().flatten().collect();
        let knots_u = knots::clamped_uniform(size_u, degree_u);
        let knots_v = knots::clamped_uniform(size_v, degree_v);
        Self::new(
            control_points,
            size_u,
            size_v,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn validate(
        control_points: &[Point3<f64>],
        size_u: usize,
        size_v: usize,
        knots_u: &[f64],
        knots_v: &[f64],
        degree_u: usize,
        degree_v: usize,
        weights: Option<&[f64]>,
    ) -> Result<()> {
        if degree_u == 0 || size_u < degree_u + 1 {
            return Err(KernelError::InvalidDegree {
                degree: degree_u,
                num_ctrlpts: size_u,
            });
        }
        if degree_v == 0 || size_v < degree_v + 1 {
            return Err(KernelError::InvalidDegree {
                degree: degree_v,
                num_ctrlpts: size_v,
            });
        }
        if control_points.len() != size_u * size_v {
            return Err(KernelError::invalid_knot_vector(format!(
                "expected {} control points for a {}x{} grid, got {}",
                size_u * size_v,
                size_u,
                size_v,
                control_points.len()
            )));
        }
        knots::validate(degree_u, knots_u, size_u)?;
        knots::validate(degree_v, knots_v, size_v)?;
        if let Some(weights) = weights {
            if weights.len() != control_points.len() {
                return Err(KernelError::WeightCountMismatch {
                    num_ctrlpts: control_points.len(),
                    num_weights: weights.len(),
                });
            }
            for (index, &value) in weights.iter().enumerate() {
                if value <= 0.0 {
                    return Err(KernelError::InvalidWeight { index, value });
                }
            }
        }
        Ok(())
    }

    /// Build a surface from a homogeneous grid produced by a kernel
    /// operation. Valid by construction, so no re-validation.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_homogeneous(
        points: Vec<Homogeneous<3>>,
        size_u: usize,
        size_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
        rational: bool,
    ) -> Self {
        let control_points = points.iter().map(Homogeneous::project).collect();
        let weights = rational.then(|| points.iter().map(|hp| hp.w).collect());
        Self {
            control_points,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
            size_u,
            size_v,
            weights,
        }
    }

    /// Control grid in homogeneous form, row-major.
    pub(crate) fn homogeneous(&self) -> Vec<Homogeneous<3>> {
        match &self.weights {
            Some(weights) => self
                .control_points
                .iter()
                .zip(weights)
                .map(|(p, &w)| Homogeneous::lift(p, w))
                .collect(),
            None => self
                .control_points
                .iter()
                .map(|p| Homogeneous::lift(p, 1.0))
                .collect(),
        }
    }

    /// Get the control points (row-major).
    #[must_use]
    pub fn control_points(&self) -> &[Point3<f64>] {
        &self.control_points
    }

    /// Get the control point at grid position `(i, j)`.
    #[must_use]
    pub fn control_point(&self, i: usize, j: usize) -> &Point3<f64> {
        &self.control_points[i * self.size_v + j]
    }

    /// Get the weights, if the surface is rational.
    #[must_use]
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Get the u-direction knot vector.
    #[must_use]
    pub fn knots_u(&self) -> &[f64] {
        &self.knots_u
    }

    /// Get the v-direction knot vector.
    #[must_use]
    pub fn knots_v(&self) -> &[f64] {
        &self.knots_v
    }

    /// Get the u-direction degree.
    #[must_use]
    pub fn degree_u(&self) -> usize {
        self.degree_u
    }

    /// Get the v-direction degree.
    #[must_use]
    pub fn degree_v(&self) -> usize {
        self.degree_v
    }

    /// Number of control points in the u-direction.
    #[must_use]
    pub fn size_u(&self) -> usize {
        self.size_u
    }

    /// Number of control points in the v-direction.
    #[must_use]
    pub fn size_v(&self) -> usize {
        self.size_v
    }

    /// Whether the surface carries weights.
    #[must_use]
    pub fn is_rational(&self) -> bool {
        self.weights.is_some()
    }

    /// The valid u-parameter interval.
    #[must_use]
    pub fn domain_u(&self) -> (f64, f64) {
        let p = self.degree_u;
        (self.knots_u[p], self.knots_u[self.knots_u.len() - p - 1])
    }

    /// The valid v-parameter interval.
    #[must_use]
    pub fn domain_v(&self) -> (f64, f64) {
        let p = self.degree_v;
        (self.knots_v[p], self.knots_v[self.knots_v.len() - p - 1])
    }

    pub(crate) fn clamp_params(&self, u: f64, v: f64) -> (f64, f64) {
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();
        (u.clamp(u_min, u_max), v.clamp(v_min, v_max))
    }

    /// Whether the u-direction boundary isocurves coincide (e.g. a cylinder
    /// parameterized around its axis in u).
    #[must_use]
    pub fn is_closed_u(&self) -> bool {
        let last = (self.size_u - 1) * self.size_v;
        (0..self.size_v).all(|j| {
            (self.control_points[j] - self.control_points[last + j]).norm() < 1e-10
        })
    }

    /// Whether the v-direction boundary isocurves coincide.
    #[must_use]
    pub fn is_closed_v(&self) -> bool {
        (0..self.size_u).all(|i| {
            let row = i * self.size_v;
            (self.control_points[row] - self.control_points[row + self.size_v - 1]).norm() < 1e-10
        })
    }

    /// Evaluate the surface at `(u, v)`.
    ///
    /// Parameters outside the domain rectangle are clamped to its boundary.
    /// Basis functions of the two directions multiply; for rational surfaces
    /// the weighted grid sum is perspective-divided by its weight component.
    #[must_use]
    pub fn point_at(&self, u: f64, v: f64) -> Point3<f64> {
        let (u, v) = self.clamp_params(u, v);
        let span_u = find_span(self.degree_u, &self.knots_u, self.size_u, u);
        let span_v = find_span(self.degree_v, &self.knots_v, self.size_v, v);
        let basis_u = basis::basis_functions(self.degree_u, &self.knots_u, span_u, u);
        let basis_v = basis::basis_functions(self.degree_v, &self.knots_v, span_v, v);

        let mut acc = Homogeneous::<3>::zero();
        for (i, &bu) in basis_u.iter().enumerate() {
            let row = (span_u - self.degree_u + i) * self.size_v;
            for (j, &bv) in basis_v.iter().enumerate() {
                let idx = row + span_v - self.degree_v + j;
                let w = self.weights.as_ref().map_or(1.0, |ws| ws[idx]);
                let hp = Homogeneous::lift(&self.control_points[idx], w);
                acc.scaled_add(&hp, bu * bv);
            }
        }
        acc.project()
    }

    /// Evaluate the surface point and its partial derivatives up to `order`
    /// in each direction.
    ///
    /// Entry `[k][l]` is ∂^(k+l) S / ∂u^k ∂v^l; entry `[0][0]` is the point
    /// itself. Rational surfaces apply the two-direction quotient-rule
    /// recursion to the homogeneous numerator and denominator together.
    #[must_use]
    pub fn derivatives(&self, u: f64, v: f64, order: usize) -> Vec<Vec<Vector3<f64>>> {
        let (u, v) = self.clamp_params(u, v);
        let span_u = find_span(self.degree_u, &self.knots_u, self.size_u, u);
        let span_v = find_span(self.degree_v, &self.knots_v, self.size_v, v);
        let ders_u =
            basis::basis_function_derivatives(self.degree_u, &self.knots_u, span_u, u, order);
        let ders_v =
            basis::basis_function_derivatives(self.degree_v, &self.knots_v, span_v, v, order);

        // Derivatives of the homogeneous surface A(u, v), w(u, v)
        let mut aders = vec![vec![Vector3::zeros(); order + 1]; order + 1];
        let mut wders = vec![vec![0.0; order + 1]; order + 1];

        for k in 0..=order {
            for l in 0..=order {
                for (i, &bu) in ders_u[k].iter().enumerate() {
                    let row = (span_u - self.degree_u + i) * self.size_v;
                    for (j, &bv) in ders_v[l].iter().enumerate() {
                        let idx = row + span_v - self.degree_v + j;
                        let w = self.weights.as_ref().map_or(1.0, |ws| ws[idx]);
                        aders[k][l] += self.control_points[idx].coords * (w * bu * bv);
                        wders[k][l] += w * bu * bv;
                    }
                }
            }
        }

        if self.weights.is_none() {
            return aders;
        }

        // S^(k,l) = (A^(k,l) - binomial-weighted lower-order terms) / w
        let mut skl = vec![vec![Vector3::zeros(); order + 1]; order + 1];
        for k in 0..=order {
            for l in 0..=order {
                let mut value = aders[k][l];
                for j in 1..=l {
                    value -= skl[k][l - j] * (basis::binomial(l, j) * wders[0][j]);
                }
                for i in 1..=k {
                    let bik = basis::binomial(k, i);
                    value -= skl[k - i][l] * (bik * wders[i][0]);
                    for j in 1..=l {
                        value -= skl[k - i][l - j]
                            * (bik * basis::binomial(l, j) * wders[i][j]);
                    }
                }
                skl[k][l] = value / wders[0][0];
            }
        }
        skl
    }

    /// Extract the isoparametric curve at constant `u`.
    ///
    /// The curve runs in the v-direction and shares the surface's v-knot
    /// vector and degree. Works by raising the knot multiplicity at `u` to
    /// the degree (half of a split) and reading off the control row at the
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ParameterOutOfDomain`] if `u` is outside the
    /// domain or exactly on its boundary.
    pub fn isocurve_u(&self, u: f64) -> Result<NurbsCurve3> {
        let (min, max) = self.domain_u();
        if u <= min || u >= max {
            return Err(KernelError::out_of_domain(u, min, max));
        }

        // saturating: a parameter within knot tolerance of the clamped end
        // already carries full multiplicity
        let multiplicity = find_multiplicity(u, &self.knots_u);
        let count = self.degree_u.saturating_sub(multiplicity);
        let span = find_span(self.degree_u, &self.knots_u, self.size_u, u) - self.degree_u + 1;

        let (grid, new_size_u, _) = refine::inserted_grid_u(self, u, count);
        let row = span + count - 1;
        debug_assert!(row < new_size_u);
        let points: Vec<Homogeneous<3>> =
            grid[row * self.size_v..(row + 1) * self.size_v].to_vec();

        Ok(NurbsCurve3::from_homogeneous(
            points,
            self.knots_v.clone(),
            self.degree_v,
            self.is_rational(),
        ))
    }

    /// Extract the isoparametric curve at constant `v`.
    ///
    /// The curve runs in the u-direction and shares the surface's u-knot
    /// vector and degree.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ParameterOutOfDomain`] if `v` is outside the
    /// domain or exactly on its boundary.
    pub fn isocurve_v(&self, v: f64) -> Result<NurbsCurve3> {
        let (min, max) = self.domain_v();
        if v <= min || v >= max {
            return Err(KernelError::out_of_domain(v, min, max));
        }

        let multiplicity = find_multiplicity(v, &self.knots_v);
        let count = self.degree_v.saturating_sub(multiplicity);
        let span = find_span(self.degree_v, &self.knots_v, self.size_v, v) - self.degree_v + 1;

        let (grid, new_size_v, _) = refine::inserted_grid_v(self, v, count);
        let col = span + count - 1;
        debug_assert!(col < new_size_v);
        let points: Vec<Homogeneous<3>> = (0..self.size_u)
            .map(|i| grid[i * new_size_v + col])
            .collect();

        Ok(NurbsCurve3::from_homogeneous(
            points,
            self.knots_u.clone(),
            self.degree_u,
            self.is_rational(),
        ))
    }
}
