//! NURBS curves.
//!
//! A single curve type covers the non-rational (B-spline) and rational
//! (NURBS) cases: rational-ness is an optional per-control-point weight
//! vector, not a separate type. The dimension of the ambient space is a
//! const generic, so planar and spatial curves share every algorithm.

use crate::knots::{self, find_span};
use crate::{basis, KernelError, Result};
use nalgebra::{Point, SVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A control point in homogeneous form: weighted coordinates plus the weight.
///
/// Refinement and evaluation run on this representation so the rational and
/// non-rational paths share the same convex-combination arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Homogeneous<const D: usize> {
    /// Weighted coordinates `w * P`.
    pub(crate) coords: SVector<f64, D>,
    /// Weight `w` (1.0 for non-rational geometry).
    pub(crate) w: f64,
}

impl<const D: usize> Homogeneous<D> {
    pub(crate) fn lift(point: &Point<f64, D>, w: f64) -> Self {
        Self {
            coords: point.coords * w,
            w,
        }
    }

    pub(crate) fn project(&self) -> Point<f64, D> {
        Point::from(self.coords / self.w)
    }

    pub(crate) fn zero() -> Self {
        Self {
            coords: SVector::zeros(),
            w: 0.0,
        }
    }

    /// Convex combination `(1 - alpha) * a + alpha * b`.
    pub(crate) fn lerp(a: &Self, b: &Self, alpha: f64) -> Self {
        Self {
            coords: a.coords * (1.0 - alpha) + b.coords * alpha,
            w: a.w * (1.0 - alpha) + b.w * alpha,
        }
    }

    pub(crate) fn scaled_add(&mut self, other: &Self, factor: f64) {
        self.coords += other.coords * factor;
        self.w += other.w * factor;
    }
}

/// A NURBS curve of arbitrary degree in `D`-dimensional space.
///
/// Defined by a degree, `n >= degree + 1` control points, a knot vector of
/// length `n + degree + 1`, and optional strictly positive weights. The
/// valid parameter interval is [`Self::domain`], determined by the knot
/// vector; it is **not** normalized to `[0, 1]`.
///
/// Curves are immutable value types: every kernel operation returns a new
/// curve and leaves its input untouched.
///
/// # Example
///
/// ```
/// use nurbs_core::NurbsCurve3;
/// use nalgebra::Point3;
///
/// let curve = NurbsCurve3::clamped(
///     vec![
///         Point3::new(0.0, 0.0, 0.0),
///         Point3::new(1.0, 2.0, 0.0),
///         Point3::new(3.0, 2.0, 0.0),
///         Point3::new(4.0, 0.0, 0.0),
///     ],
///     3,
/// )
/// .unwrap();
///
/// let mid = curve.point_at(0.5);
/// assert!((mid.x - 2.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NurbsCurve<const D: usize> {
    control_points: Vec<Point<f64, D>>,
    knots: Vec<f64>,
    degree: usize,
    weights: Option<Vec<f64>>,
}

/// A planar NURBS curve.
pub type NurbsCurve2 = NurbsCurve<2>;
/// A spatial NURBS curve.
pub type NurbsCurve3 = NurbsCurve<3>;

impl<const D: usize> NurbsCurve<D> {
    /// Create a non-rational curve with an explicit knot vector.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidDegree`] if the degree is zero or there
    /// are fewer than `degree + 1` control points, and
    /// [`KernelError::InvalidKnotVector`] if the knot vector has the wrong
    /// length or is not non-decreasing.
    pub fn new(control_points: Vec<Point<f64, D>>, knots: Vec<f64>, degree: usize) -> Result<Self> {
        Self::validate(&control_points, &knots, degree, None)?;
        Ok(Self {
            control_points,
            knots,
            degree,
            weights: None,
        })
    }

    /// Create a rational curve with explicit weights and knot vector.
    ///
    /// # Errors
    ///
    /// As [`Self::new`], plus [`KernelError::WeightCountMismatch`] if the
    /// weights don't pair up with the control points and
    /// [`KernelError::InvalidWeight`] if any weight is not strictly positive.
    pub fn rational(
        control_points: Vec<Point<f64, D>>,
        weights: Vec<f64>,
        knots: Vec<f64>,
        degree: usize,
    ) -> Result<Self> {
        Self::validate(&control_points, &knots, degree, Some(&weights))?;
        Ok(Self {
            control_points,
            knots,
            degree,
            weights: Some(weights),
        })
    }

    /// Create a clamped non-rational curve with uniform interior knots on
    /// `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidDegree`] if the degree is zero or there
    /// are fewer than `degree + 1` control points.
    pub fn clamped(control_points: Vec<Point<f64, D>>, degree: usize) -> Result<Self> {
        if degree == 0 || control_points.len() < degree + 1 {
            return Err(KernelError::InvalidDegree {
                degree,
                num_ctrlpts: control_points.len(),
            });
        }
        let knots = knots::clamped_uniform(control_points.len(), degree);
        Self::new(control_points, knots, degree)
    }

    fn validate(
        control_points: &[Point<f64, D>],
        knots: &[f64],
        degree: usize,
        weights: Option<&[f64]>,
    ) -> Result<()> {
        let n = control_points.len();
        if degree == 0 || n < degree + 1 {
            return Err(KernelError::InvalidDegree {
                degree,
                num_ctrlpts: n,
            });
        }
        knots::validate(degree, knots, n)?;
        if let Some(weights) = weights {
            if weights.len() != n {
                return Err(KernelError::WeightCountMismatch {
                    num_ctrlpts: n,
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

    /// Build a curve from homogeneous control points produced by a kernel
    /// operation. The inputs are valid by construction, so no re-validation.
    pub(crate) fn from_homogeneous(
        points: Vec<Homogeneous<D>>,
        knots: Vec<f64>,
        degree: usize,
        rational: bool,
    ) -> Self {
        let control_points = points.iter().map(Homogeneous::project).collect();
        let weights = rational.then(|| points.iter().map(|hp| hp.w).collect());
        Self {
            control_points,
            knots,
            degree,
            weights,
        }
    }

    /// Control points in homogeneous form (unit weights when non-rational).
    pub(crate) fn homogeneous(&self) -> Vec<Homogeneous<D>> {
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

    /// Get the control points.
    #[must_use]
    pub fn control_points(&self) -> &[Point<f64, D>] {
        &self.control_points
    }

    /// Get the weights, if the curve is rational.
    #[must_use]
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Get the knot vector.
    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Get the degree.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Get the number of control points.
    #[must_use]
    pub fn num_control_points(&self) -> usize {
        self.control_points.len()
    }

    /// Whether the curve carries weights.
    #[must_use]
    pub fn is_rational(&self) -> bool {
        self.weights.is_some()
    }

    /// The valid parameter interval `[knots[degree], knots[n]]`.
    #[must_use]
    pub fn domain(&self) -> (f64, f64) {
        let p = self.degree;
        (self.knots[p], self.knots[self.knots.len() - p - 1])
    }

    /// Whether the curve's endpoints coincide.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let (start, end) = self.domain();
        (self.point_at(start) - self.point_at(end)).norm() < 1e-10
    }

    /// Clamp a parameter into the valid domain.
    pub(crate) fn clamp_param(&self, u: f64) -> f64 {
        let (min, max) = self.domain();
        u.clamp(min, max)
    }

    /// Evaluate the curve at parameter `u`.
    ///
    /// Parameters outside the domain are clamped to its boundary. For
    /// rational curves the homogeneous sum is perspective-divided by its
    /// accumulated weight, which is what lets NURBS represent exact conics.
    #[must_use]
    pub fn point_at(&self, u: f64) -> Point<f64, D> {
        let u = self.clamp_param(u);
        let span = find_span(self.degree, &self.knots, self.control_points.len(), u);
        let values = basis::basis_functions(self.degree, &self.knots, span, u);

        if let Some(weights) = &self.weights {
            let mut acc = Homogeneous::<D>::zero();
            for (i, &value) in values.iter().enumerate() {
                let idx = span - self.degree + i;
                let hp = Homogeneous::lift(&self.control_points[idx], weights[idx]);
                acc.scaled_add(&hp, value);
            }
            acc.project()
        } else {
            let mut point = SVector::<f64, D>::zeros();
            for (i, &value) in values.iter().enumerate() {
                let idx = span - self.degree + i;
                point += self.control_points[idx].coords * value;
            }
            Point::from(point)
        }
    }

    /// Evaluate the curve point and its derivatives up to `order`.
    ///
    /// Entry `0` is the point itself (as a vector from the origin), entry
    /// `k` the k-th derivative. Rational curves use the quotient-rule
    /// recursion on the homogeneous numerator and denominator.
    #[must_use]
    pub fn derivatives(&self, u: f64, order: usize) -> Vec<SVector<f64, D>> {
        let u = self.clamp_param(u);
        let span = find_span(self.degree, &self.knots, self.control_points.len(), u);
        let ders = basis::basis_function_derivatives(self.degree, &self.knots, span, u, order);

        // Derivatives of the homogeneous curve A(u), w(u)
        let mut aders: Vec<SVector<f64, D>> = vec![SVector::zeros(); order + 1];
        let mut wders = vec![0.0; order + 1];

        let weights = self.weights.as_deref();
        for (k, row) in ders.iter().enumerate() {
            for (i, &value) in row.iter().enumerate() {
                let idx = span - self.degree + i;
                let w = weights.map_or(1.0, |ws| ws[idx]);
                aders[k] += self.control_points[idx].coords * (w * value);
                wders[k] += w * value;
            }
        }

        if self.weights.is_none() {
            return aders;
        }

        // Rational correction: C^(k) = (A^(k) - sum binom(k,i) w^(i) C^(k-i)) / w
        let mut cders: Vec<SVector<f64, D>> = Vec::with_capacity(order + 1);
        for k in 0..=order {
            let mut v = aders[k];
            for i in 1..=k {
                v -= cders[k - i] * (basis::binomial(k, i) * wders[i]);
            }
            cders.push(v / wders[0]);
        }
        cders
    }
}
