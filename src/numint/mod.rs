//! Numerical integration capabilities.
//!
//! The distribution layer treats integration as a black box behind the
//! [`Integrator`] trait: a vector-valued [`Integrand`] is integrated either
//! over an axis-aligned [`Interval`](crate::geom::Interval) or over a mesh.
//! Whether the mesh path is available for a given dimension is a capability
//! query ([`Integrator::supports_mesh`]) checked *before* choosing the fast
//! path, never discovered by catching an error.
//!
//! Two engines are provided: [`GaussLegendre`], a tensorized Gauss–Legendre
//! product rule over intervals, and [`SimplicialCubature`], which integrates
//! over each simplex of a mesh through the unit-hypercube change of variables
//! of [`SimplexTransform`](crate::geom::SimplexTransform).

mod cubature;
mod quadrature;

pub use cubature::SimplicialCubature;
pub use quadrature::{gauss_legendre_rule, GaussLegendre};

use crate::geom::{GeomError, Interval, MeshDomain};
use nalgebra::DVector;
use std::fmt::Debug;
use thiserror::Error;

/// Errors associated with the [`numint`](crate::numint) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum NumIntError {
    #[error("integrand dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid quadrature nodes: {msg}")]
    InvalidNodes { msg: &'static str },

    #[error("{name} does not support this integration domain")]
    UnsupportedDomain { name: &'static str },

    #[error(transparent)]
    Geom(#[from] GeomError),
}

/// A vector-valued function suitable for numerical integration.
pub trait Integrand: Sync {
    /// Input dimension.
    fn input_dim(&self) -> usize;

    /// Number of output components (one sub-integral is returned per
    /// component).
    fn output_dim(&self) -> usize;

    /// Evaluates the integrand.
    fn eval(&self, x: &DVector<f64>) -> DVector<f64>;
}

/// Adapter turning a closure into an [`Integrand`].
pub struct FnIntegrand<F> {
    input_dim: usize,
    output_dim: usize,
    f: F,
}

impl<F> FnIntegrand<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64> + Sync,
{
    /// Wraps `f` with the given input/output dimensions.
    pub fn new(input_dim: usize, output_dim: usize, f: F) -> Self {
        Self {
            input_dim,
            output_dim,
            f,
        }
    }
}

impl<F> Integrand for FnIntegrand<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64> + Sync,
{
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn eval(&self, x: &DVector<f64>) -> DVector<f64> {
        (self.f)(x)
    }
}

/// Black-box cubature capability: integrates a vector-valued function over an
/// interval or a mesh, returning one scalar per output component.
pub trait Integrator: Debug + Send + Sync {
    /// Integrates `f` over an axis-aligned interval.
    fn integrate_over_interval(
        &self,
        f: &dyn Integrand,
        interval: &Interval,
    ) -> Result<Vec<f64>, NumIntError>;

    /// Integrates `f` over a mesh.
    fn integrate_over_mesh(
        &self,
        f: &dyn Integrand,
        mesh: &dyn MeshDomain,
    ) -> Result<Vec<f64>, NumIntError>;

    /// Whether the mesh path is available for the given dimension.
    fn supports_mesh(&self, dim: usize) -> bool;
}
