//! Error types for kernel operations.

use thiserror::Error;

/// Errors that can occur during kernel operations.
///
/// Point inversion never returns one of these: it degrades to a best-effort
/// result and reports the residual instead (see [`crate::invert`]).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// Degree is zero or too large for the number of control points.
    #[error("invalid degree {degree} for {num_ctrlpts} control points (need degree >= 1 and degree + 1 <= count)")]
    InvalidDegree {
        /// Specified degree.
        degree: usize,
        /// Number of control points supplied.
        num_ctrlpts: usize,
    },

    /// Knot vector is non-monotonic or has the wrong total multiplicity.
    #[error("invalid knot vector: {reason}")]
    InvalidKnotVector {
        /// Description of what's wrong with the knot vector.
        reason: String,
    },

    /// Weight values must be strictly positive.
    #[error("invalid weight at index {index}: {value} (must be positive)")]
    InvalidWeight {
        /// Index of the invalid weight.
        index: usize,
        /// The invalid weight value.
        value: f64,
    },

    /// Weights, when present, must pair one-to-one with control points.
    #[error("control points ({num_ctrlpts}) and weights ({num_weights}) must have the same length")]
    WeightCountMismatch {
        /// Number of control points supplied.
        num_ctrlpts: usize,
        /// Number of weights supplied.
        num_weights: usize,
    },

    /// Requested multiplicity increase exceeds `degree - current multiplicity`.
    #[error("cannot insert knot {requested} times: at most {allowed} insertions remain before exceeding the degree")]
    InsertionExceedsDegree {
        /// Requested number of insertions.
        requested: usize,
        /// Maximum number of insertions still allowed.
        allowed: usize,
    },

    /// Parameter lies outside the valid interval, or on a boundary where a
    /// strictly interior value is required.
    #[error("parameter {parameter} is outside the valid domain [{min}, {max}]")]
    ParameterOutOfDomain {
        /// The offending parameter value.
        parameter: f64,
        /// Lower domain bound.
        min: f64,
        /// Upper domain bound.
        max: f64,
    },

    /// A zero-length derivative was encountered mid-iteration.
    ///
    /// The inversion pipeline recovers from this internally by falling
    /// through to its minimization stage and never returns it; the variant
    /// and [`Self::degenerate`] are error vocabulary for callers layering
    /// their own iterations on top of the kernel's derivatives.
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry {
        /// Description of the degeneracy.
        reason: String,
    },
}

impl KernelError {
    /// Create an invalid knot vector error.
    #[must_use]
    pub fn invalid_knot_vector(reason: impl Into<String>) -> Self {
        Self::InvalidKnotVector {
            reason: reason.into(),
        }
    }

    /// Create a degenerate geometry error.
    #[must_use]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
        }
    }

    /// Create a parameter-out-of-domain error.
    #[must_use]
    pub fn out_of_domain(parameter: f64, min: f64, max: f64) -> Self {
        Self::ParameterOutOfDomain {
            parameter,
            min,
            max,
        }
    }

    /// Check if this is a parameter-out-of-domain error.
    #[must_use]
    pub fn is_out_of_domain(&self) -> bool {
        matches!(self, Self::ParameterOutOfDomain { .. })
    }

    /// Check if this is an insertion-exceeds-degree error.
    #[must_use]
    pub fn is_insertion_exceeds_degree(&self) -> bool {
        matches!(self, Self::InsertionExceedsDegree { .. })
    }
}
