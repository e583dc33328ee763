//! Geometric primitives: axis-aligned intervals, simplicial meshes and the
//! unit-hypercube-to-simplex transformation.
//!
//! The [`MeshDomain`] trait is the minimal read-only contract the distribution
//! layer consumes: simplex count, vertex sets, bounding interval, a
//! point-in-domain test and intersection with an axis-aligned interval. The
//! concrete [`SimplicialMesh`] implements it for meshes given as explicit
//! vertex/simplex lists.

mod interval;
mod mesh;
mod simplex;

pub use interval::Interval;
pub use mesh::{MeshDomain, SimplicialMesh};
pub use simplex::SimplexTransform;

use thiserror::Error;

/// Errors associated with the [`geom`](crate::geom) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum GeomError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid interval: {msg}")]
    InvalidInterval { msg: &'static str },

    #[error("invalid mesh: {msg}")]
    InvalidMesh { msg: &'static str },

    #[error("invalid simplex: {msg}")]
    InvalidSimplex { msg: &'static str },

    #[error("mesh/interval intersection is not supported in dimension {dim}")]
    UnsupportedIntersection { dim: usize },
}
