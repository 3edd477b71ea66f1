//! NURBS geometry kernel: evaluation, refinement, and point inversion.
//!
//! This crate is the parametric substrate of the geometry stack. It models
//! Non-Uniform Rational B-Spline curves and surfaces and the algebra around
//! them:
//!
//! - [`NurbsCurve`] / [`NurbsSurface`] - evaluation and differentiation of
//!   rational and non-rational geometry of arbitrary degree
//! - **Knot refinement** - Boehm knot insertion, splitting at a parameter
//! - **Bezier decomposition** - reduction to single-span segments/patches
//!   ([`BezierSegment`], [`BezierPatch`])
//! - **Point inversion** - mapping a spatial point back to parametric
//!   coordinates ([`CurveProjection`], [`SurfaceProjection`])
//!
//! Everything is an immutable value type: kernel operations return new
//! geometry and never mutate their inputs, so concurrent use needs no
//! synchronization.
//!
//! # Example
//!
//! ```
//! use nurbs_core::NurbsCurve3;
//! use nalgebra::Point3;
//!
//! let curve = NurbsCurve3::clamped(
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 2.0, 0.0),
//!         Point3::new(3.0, 2.0, 0.0),
//!         Point3::new(4.0, 0.0, 0.0),
//!     ],
//!     3,
//! )
//! .unwrap();
//!
//! // Refine without changing the shape, then cut in two
//! let refined = curve.insert_knot(0.5, 2).unwrap();
//! let (left, right) = curve.split(0.5).unwrap();
//! assert_eq!(left.domain(), (0.0, 0.5));
//! assert_eq!(right.domain(), (0.5, 1.0));
//!
//! // Map a spatial point back into parameter space
//! let projection = refined.closest_parameter(&curve.point_at(0.3));
//! assert!(projection.distance < 1e-6);
//! ```
//!
//! # Parameterization
//!
//! The valid parameter interval of a curve is `[knots[degree],
//! knots[n]]` per direction; it is not normalized to `[0, 1]`. Splitting
//! and decomposition keep the original parameterization, so a segment's
//! `range` can be used to evaluate the parent geometry directly.
//!
//! # Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for all geometry types
//!
//! # Integration with Other Crates
//!
//! This kernel exposes no file format or topology: BREP construction,
//! surface intersection, and meshing are consumers of the evaluation and
//! inversion primitives defined here.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::int_plus_one,
    clippy::suspicious_operation_groupings,
    clippy::cast_possible_truncation,
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::suboptimal_flops,
    clippy::while_float,
    clippy::missing_const_for_fn,
    clippy::cast_lossless,
    clippy::doc_markdown,
    clippy::redundant_closure_for_method_calls,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::option_if_let_else,
    clippy::items_after_statements,
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::needless_range_loop,
    clippy::use_self,
    clippy::let_and_return,
    clippy::imprecise_flops,
    clippy::return_self_not_must_use
)]

pub mod basis;
mod curve;
mod decompose;
mod error;
mod invert;
pub mod knots;
mod refine;
mod surface;

// Re-export core types
pub use curve::{NurbsCurve, NurbsCurve2, NurbsCurve3};
pub use decompose::{BezierPatch, BezierSegment, CurveDecomposition, SplitDirection};
pub use error::KernelError;
pub use invert::{CurveProjection, SurfaceProjection};
pub use surface::NurbsSurface;

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
