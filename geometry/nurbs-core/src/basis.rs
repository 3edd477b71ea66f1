//! B-spline basis functions and their derivatives.
//!
//! The Cox–de Boor recursion is evaluated bottom-up through a triangular
//! table rather than by naive recursion, for speed and numerical stability.

/// Values below this are snapped to exactly zero so rounding noise cannot
/// perturb span boundaries.
const BASIS_ZERO_SNAP: f64 = 1e-12;

/// Compute the `degree + 1` non-zero basis functions at parameter `u`.
///
/// `span` must come from [`crate::knots::find_span`] for the same knot
/// vector and parameter.
#[must_use]
pub fn basis_functions(degree: usize, knots: &[f64], span: usize, u: f64) -> Vec<f64> {
    let p = degree;
    let mut values = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    values[0] = 1.0;

    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;

        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            if denom.abs() > 1e-15 {
                let temp = values[r] / denom;
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            } else {
                // Coincident knots collapse this leg of the triangle
                values[r] = saved;
                saved = 0.0;
            }
        }
        values[j] = saved;
    }

    for v in &mut values {
        if v.abs() < BASIS_ZERO_SNAP {
            *v = 0.0;
        }
    }

    values
}

/// Compute basis functions and their derivatives up to `order`.
///
/// Returns a table `ders` with `order + 1` rows of `degree + 1` columns;
/// `ders[k][j]` is the k-th derivative of the j-th non-zero basis function.
/// Rows beyond the degree are zero (the basis is piecewise degree-`p`
/// polynomial).
#[must_use]
pub fn basis_function_derivatives(
    degree: usize,
    knots: &[f64],
    span: usize,
    u: f64,
    order: usize,
) -> Vec<Vec<f64>> {
    let p = degree;
    let n = order.min(p);

    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    // ndu holds the basis triangle in the upper part and the knot
    // differences in the lower part, as in the values computation.
    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    ndu[0][0] = 1.0;

    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;

        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            ndu[j][r] = if denom.abs() > 1e-15 { denom } else { 1.0 };
            let temp = ndu[r][j - 1] / ndu[j][r];

            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    let mut ders = vec![vec![0.0; p + 1]; order + 1];
    for j in 0..=p {
        ders[0][j] = ndu[j][p];
    }

    // Two alternating rows of difference coefficients
    let mut a = vec![vec![0.0; p + 1]; 2];

    for r in 0..=p {
        let mut s1 = 0;
        let mut s2 = 1;
        a[0][0] = 1.0;

        for k in 1..=n {
            let mut d = 0.0;
            let rk = r as i32 - k as i32;
            let pk = p as i32 - k as i32;

            if r >= k {
                a[s2][0] = a[s1][0] / ndu[(pk + 1) as usize][rk as usize];
                d = a[s2][0] * ndu[rk as usize][pk as usize];
            }

            let j1 = if rk >= -1 { 1 } else { -rk };
            let j2 = if r as i32 - 1 <= pk {
                k as i32 - 1
            } else {
                p as i32 - r as i32
            };

            for j in j1..=j2 {
                let ju = j as usize;
                a[s2][ju] =
                    (a[s1][ju] - a[s1][ju - 1]) / ndu[(pk + 1) as usize][(rk + j) as usize];
                d += a[s2][ju] * ndu[(rk + j) as usize][pk as usize];
            }

            if r as i32 <= pk {
                a[s2][k] = -a[s1][k - 1] / ndu[(pk + 1) as usize][r];
                d += a[s2][k] * ndu[r][pk as usize];
            }

            ders[k][r] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    // Multiply by p! / (p - k)!
    let mut factor = p as f64;
    for k in 1..=n {
        for j in 0..=p {
            ders[k][j] *= factor;
        }
        factor *= (p - k) as f64;
    }

    ders
}

/// Binomial coefficient as a float, for the rational derivative recursions.
#[must_use]
pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knots::find_span;
    use approx::assert_relative_eq;

    #[test]
    fn test_partition_of_unity() {
        let knots = vec![0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        for i in 0..=20 {
            let u = i as f64 / 20.0;
            let span = find_span(3, &knots, 6, u);
            let values = basis_functions(3, &knots, span, u);
            let sum: f64 = values.iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bezier_basis_matches_bernstein() {
        // Degree-3 clamped single segment: basis functions are the Bernstein
        // polynomials.
        let knots = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let u = 0.4;
        let span = find_span(3, &knots, 4, u);
        let values = basis_functions(3, &knots, span, u);

        let t = u;
        let s = 1.0 - t;
        assert_relative_eq!(values[0], s * s * s, epsilon = 1e-12);
        assert_relative_eq!(values[1], 3.0 * s * s * t, epsilon = 1e-12);
        assert_relative_eq!(values[2], 3.0 * s * t * t, epsilon = 1e-12);
        assert_relative_eq!(values[3], t * t * t, epsilon = 1e-12);
    }

    #[test]
    fn test_derivatives_row_zero_matches_values() {
        let knots = vec![0.0, 0.0, 0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 1.0];
        let u = 0.6;
        let span = find_span(2, &knots, 6, u);
        let values = basis_functions(2, &knots, span, u);
        let ders = basis_function_derivatives(2, &knots, span, u, 2);

        for j in 0..=2 {
            assert_relative_eq!(ders[0][j], values[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_first_derivatives_sum_to_zero() {
        // d/du of the partition of unity is zero
        let knots = vec![0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        for i in 1..20 {
            let u = i as f64 / 20.0;
            let span = find_span(3, &knots, 6, u);
            let ders = basis_function_derivatives(3, &knots, span, u, 2);
            let sum1: f64 = ders[1].iter().sum();
            let sum2: f64 = ders[2].iter().sum();
            assert_relative_eq!(sum1, 0.0, epsilon = 1e-9);
            assert_relative_eq!(sum2, 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_derivative_against_finite_difference() {
        let knots = vec![0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        let u = 0.45;
        let h = 1e-6;
        let span = find_span(3, &knots, 6, u);
        let ders = basis_function_derivatives(3, &knots, span, u, 1);

        let plus = basis_functions(3, &knots, find_span(3, &knots, 6, u + h), u + h);
        let minus = basis_functions(3, &knots, find_span(3, &knots, 6, u - h), u - h);
        for j in 0..=3 {
            let fd = (plus[j] - minus[j]) / (2.0 * h);
            assert_relative_eq!(ders[1][j], fd, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_binomial() {
        assert_relative_eq!(binomial(4, 2), 6.0);
        assert_relative_eq!(binomial(5, 0), 1.0);
        assert_relative_eq!(binomial(3, 3), 1.0);
        assert_relative_eq!(binomial(2, 3), 0.0);
    }

    #[test]
    fn test_rows_beyond_degree_are_zero() {
        let knots = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let span = find_span(2, &knots, 3, 0.5);
        let ders = basis_function_derivatives(2, &knots, span, 0.5, 4);
        assert_eq!(ders.len(), 5);
        for row in &ders[3..] {
            assert!(row.iter().all(|&v| v == 0.0));
        }
    }
}
