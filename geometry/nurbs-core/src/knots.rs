//! Knot-vector and span algebra.
//!
//! Pure functions over a non-decreasing sequence of parameter values. Every
//! higher-level operation (evaluation, insertion, decomposition, inversion)
//! reduces to these lookups.

use crate::{KernelError, Result};

/// Tolerance for comparing a parameter against knot values.
pub const KNOT_TOLERANCE: f64 = 1e-8;

/// Find the knot span index for parameter `u`.
///
/// Returns `i` such that `knots[i] <= u < knots[i+1]`. If `u` is at or beyond
/// the upper domain bound, the last valid span (`num_ctrlpts - 1`) is
/// returned so evaluation at the end of the domain stays in range.
#[must_use]
pub fn find_span(degree: usize, knots: &[f64], num_ctrlpts: usize, u: f64) -> usize {
    if u >= knots[num_ctrlpts] {
        return num_ctrlpts - 1;
    }

    // Binary search over the valid span range
    let mut low = degree;
    let mut high = num_ctrlpts;

    while low < high {
        let mid = (low + high) / 2;
        if knots[mid] > u {
            high = mid;
        } else {
            low = mid + 1;
        }
    }

    low - 1
}

/// Count how many knots equal `u` within [`KNOT_TOLERANCE`].
///
/// A result of 0 is valid: `u` is simply not a knot.
#[must_use]
pub fn find_multiplicity(u: f64, knots: &[f64]) -> usize {
    knots.iter().filter(|&&k| (k - u).abs() < KNOT_TOLERANCE).count()
}

/// Validate a knot vector against a degree and control-point count.
///
/// Checks the clamped-curve invariant `len(knots) == num_ctrlpts + degree + 1`,
/// monotonicity, and the interior multiplicity cap: only the domain ends may
/// repeat a value more than `degree` times.
///
/// # Errors
///
/// Returns [`KernelError::InvalidKnotVector`] on wrong length, a decreasing
/// pair, or an interior knot with multiplicity above the degree.
pub fn validate(degree: usize, knots: &[f64], num_ctrlpts: usize) -> Result<()> {
    let expected = num_ctrlpts + degree + 1;
    if knots.len() != expected {
        return Err(KernelError::invalid_knot_vector(format!(
            "expected {} knots for {} control points and degree {}, got {}",
            expected,
            num_ctrlpts,
            degree,
            knots.len()
        )));
    }

    for i in 1..knots.len() {
        if knots[i] < knots[i - 1] {
            return Err(KernelError::invalid_knot_vector(format!(
                "knot vector is not non-decreasing at index {} ({} < {})",
                i,
                knots[i],
                knots[i - 1]
            )));
        }
    }

    // A multiplicity above the degree collapses the basis over an interior
    // span; only the clamped ends may reach degree + 1
    let lower = knots[degree];
    let upper = knots[knots.len() - degree - 1];
    let mut start = 0;
    while start < knots.len() {
        let mut end = start + 1;
        while end < knots.len() && knots[end] - knots[start] < KNOT_TOLERANCE {
            end += 1;
        }
        let value = knots[start];
        let multiplicity = end - start;
        if multiplicity > degree
            && value > lower + KNOT_TOLERANCE
            && value < upper - KNOT_TOLERANCE
        {
            return Err(KernelError::invalid_knot_vector(format!(
                "interior knot {} has multiplicity {} exceeding degree {}",
                value, multiplicity, degree
            )));
        }
        start = end;
    }

    Ok(())
}

/// Generate a clamped (open) knot vector on `[0, 1]` with uniform interior
/// knots.
///
/// The first and last values are repeated `degree + 1` times so the curve
/// interpolates its end control points.
#[must_use]
pub fn clamped_uniform(num_ctrlpts: usize, degree: usize) -> Vec<f64> {
    let mut knots = Vec::with_capacity(num_ctrlpts + degree + 1);

    for _ in 0..=degree {
        knots.push(0.0);
    }

    let num_interior = num_ctrlpts - degree - 1;
    for i in 1..=num_interior {
        knots.push(i as f64 / (num_interior + 1) as f64);
    }

    for _ in 0..=degree {
        knots.push(1.0);
    }

    knots
}

/// The distinct interior knot values of a knot vector, in order.
///
/// These are the parameters at which a B-spline is only `C^(degree - mult)`
/// continuous; decomposition splits at each of them.
#[must_use]
pub fn interior_knots(degree: usize, knots: &[f64]) -> Vec<f64> {
    let interior = &knots[degree + 1..knots.len() - degree - 1];
    let mut distinct: Vec<f64> = Vec::new();
    for &k in interior {
        if distinct.last().map_or(true, |&last| (k - last).abs() >= KNOT_TOLERANCE) {
            distinct.push(k);
        }
    }
    distinct
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_find_span_clamped_cubic() {
        // Pure Bezier: degree 3, 4 control points
        let knots = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(find_span(3, &knots, 4, 0.0), 3);
        assert_eq!(find_span(3, &knots, 4, 0.5), 3);
        // Upper bound maps to the last valid span, not past it
        assert_eq!(find_span(3, &knots, 4, 1.0), 3);
    }

    #[test]
    fn test_find_span_interior_knots() {
        let knots = vec![0.0, 0.0, 0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 1.0];
        assert_eq!(find_span(2, &knots, 6, 0.1), 2);
        assert_eq!(find_span(2, &knots, 6, 0.3), 3);
        assert_eq!(find_span(2, &knots, 6, 0.5), 4);
        assert_eq!(find_span(2, &knots, 6, 0.9), 5);
        assert_eq!(find_span(2, &knots, 6, 1.0), 5);
    }

    #[test]
    fn test_find_multiplicity() {
        let knots = vec![0.0, 0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.0];
        assert_eq!(find_multiplicity(0.0, &knots), 3);
        assert_eq!(find_multiplicity(0.5, &knots), 2);
        assert_eq!(find_multiplicity(0.25, &knots), 0);
        // Within tolerance counts as equal
        assert_eq!(find_multiplicity(0.5 + 1e-10, &knots), 2);
    }

    #[test]
    fn test_validate() {
        let knots = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        assert!(validate(3, &knots, 4).is_ok());

        // Wrong length
        assert!(validate(3, &knots, 5).is_err());

        // Decreasing
        let bad = vec![0.0, 0.0, 0.0, 0.5, 0.4, 1.0, 1.0, 1.0];
        assert!(validate(2, &bad, 5).is_err());
    }

    #[test]
    fn test_validate_interior_multiplicity() {
        // Multiplicity equal to the degree is the split limit and is fine
        let ok = vec![0.0, 0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.0];
        assert!(validate(2, &ok, 5).is_ok());

        // One more collapses the interior span
        let bad = vec![0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 1.0, 1.0, 1.0];
        assert!(validate(2, &bad, 6).is_err());

        // The clamped ends may repeat degree + 1 times
        let clamped = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        assert!(validate(3, &clamped, 4).is_ok());
    }

    #[test]
    fn test_clamped_uniform() {
        let knots = clamped_uniform(5, 3);
        assert_eq!(knots.len(), 9);
        assert_eq!(&knots[..4], &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(&knots[5..], &[1.0, 1.0, 1.0, 1.0]);
        assert_relative_eq!(knots[4], 0.5, epsilon = 1e-12);
        assert!(validate(3, &knots, 5).is_ok());
    }

    #[test]
    fn test_interior_knots() {
        let knots = vec![0.0, 0.0, 0.0, 0.25, 0.5, 0.5, 0.75, 1.0, 1.0, 1.0];
        assert_eq!(interior_knots(2, &knots), vec![0.25, 0.5, 0.75]);

        let bezier = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        assert!(interior_knots(3, &bezier).is_empty());
    }
}
