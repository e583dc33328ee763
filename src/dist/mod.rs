//! Probability distributions and their compositions.
//!
//! Every distribution implements the object-safe [`Distribution`] trait:
//! density and cumulative evaluation, sampling, parameter access, moments,
//! marginalization by index subset and a concrete-type-aware equality
//! capability. Because composites implement the trait themselves, they nest:
//! a [`ConditionalJoint`] can be truncated over a mesh by [`MeshTruncated`],
//! marginalized into a [`GenericMarginal`], and so on.
//!
//! Construction is validated eagerly: dimension or parameter-count mismatches
//! are reported when a composite is built, never deferred to the first
//! evaluation. Evaluating at a point of the wrong dimension is an error;
//! a conditioning density of exactly zero is not (the composed density
//! short-circuits to zero instead of evaluating the conditioned family with
//! possibly invalid parameters).

mod conditional;
mod generic;
mod normal;
mod truncated;
mod uniform;

pub use conditional::{ConditionalJoint, Deconditioned, LinkFunction};
pub use generic::GenericMarginal;
pub use normal::Normal;
pub use truncated::{MeshTruncated, TruncationConfig};
pub use uniform::Uniform;

use crate::geom::{GeomError, Interval};
use crate::numint::NumIntError;
use crate::optim::OptimError;
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use std::any::Any;
use std::fmt::Debug;
use thiserror::Error;

/// Errors associated with the [`dist`](crate::dist) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DistError {
    #[error("point dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("parameter vector must have length {expected}, got {got}")]
    ParameterMismatch { expected: usize, got: usize },

    #[error("{name} requires a continuous distribution")]
    NotContinuous { name: &'static str },

    #[error("link function mismatch: {msg}")]
    LinkMismatch { msg: &'static str },

    #[error("the mesh carries no probability mass under the base distribution")]
    ZeroMeshMass,

    #[error("marginal indices must be distinct and within the dimension")]
    InvalidIndices,

    #[error("invalid distribution parameters: {msg}")]
    InvalidParameter { msg: &'static str },

    #[error(transparent)]
    Geom(#[from] GeomError),

    #[error(transparent)]
    NumInt(#[from] NumIntError),

    #[error(transparent)]
    Optim(#[from] OptimError),
}

/// The capability set every distribution exposes.
///
/// Objects are immutable for a given evaluation: all read methods take
/// `&self` and may be called concurrently. The mutating methods
/// (`set_parameter` and composite-specific rebinding) take `&mut self`,
/// invalidate cached moments and must therefore be externally serialized,
/// e.g. by treating a published distribution as immutable.
pub trait Distribution: Any + Debug + Send + Sync {
    /// The coordinate dimension `d ≥ 1`.
    fn dim(&self) -> usize;

    /// Whether the distribution is absolutely continuous.
    fn is_continuous(&self) -> bool {
        true
    }

    /// Probability density at `x`.
    fn pdf(&self, x: &DVector<f64>) -> Result<f64, DistError>;

    /// Cumulative probability `P(X ≤ x)` componentwise.
    fn cdf(&self, x: &DVector<f64>) -> Result<f64, DistError>;

    /// Draws one realization.
    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError>;

    /// Draws `size` independent realizations.
    fn sample_many(
        &self,
        size: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<DVector<f64>>, DistError> {
        (0..size).map(|_| self.sample(rng)).collect()
    }

    /// The numeric range. Bounds are always finite and usable for
    /// integration; the finiteness flags record which coordinates are
    /// mathematically bounded.
    fn range(&self) -> Interval;

    /// The parameter vector.
    fn parameter(&self) -> DVector<f64>;

    /// Replaces the parameter vector and invalidates cached moments.
    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError>;

    /// The mean vector.
    fn mean(&self) -> Result<DVector<f64>, DistError>;

    /// The covariance matrix.
    fn covariance(&self) -> Result<DMatrix<f64>, DistError>;

    /// The marginal distribution on an index subset.
    fn marginal(&self, indices: &[usize]) -> Result<Box<dyn Distribution>, DistError>;

    /// Type-erased view used by [`Distribution::same_as`].
    fn as_any(&self) -> &dyn Any;

    /// Equality capability: concrete-type identity plus field-wise
    /// comparison.
    fn same_as(&self, other: &dyn Distribution) -> bool;

    /// Clones the distribution behind the trait object.
    fn boxed_clone(&self) -> Box<dyn Distribution>;
}

impl Clone for Box<dyn Distribution> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Validates a marginal index subset against a dimension: non-empty,
/// strictly in range, pairwise distinct.
pub(crate) fn check_indices(indices: &[usize], dim: usize) -> Result<(), DistError> {
    if indices.is_empty() || indices.iter().any(|&i| i >= dim) {
        return Err(DistError::InvalidIndices);
    }
    let mut seen = vec![false; dim];
    for &i in indices {
        if seen[i] {
            return Err(DistError::InvalidIndices);
        }
        seen[i] = true;
    }
    Ok(())
}

/// Validates a point dimension against a distribution dimension.
pub(crate) fn check_point(point: &DVector<f64>, dim: usize) -> Result<(), DistError> {
    if point.len() != dim {
        return Err(DistError::DimensionMismatch {
            expected: dim,
            got: point.len(),
        });
    }
    Ok(())
}

/// Concatenates two vectors.
pub(crate) fn concat(a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(a.len() + b.len(), a.iter().chain(b.iter()).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_indices() {
        assert!(check_indices(&[0, 2], 3).is_ok());
        assert!(check_indices(&[], 3).is_err());
        assert!(check_indices(&[3], 3).is_err());
        assert!(check_indices(&[1, 1], 3).is_err());
    }

    #[test]
    fn test_concat() {
        let a = nalgebra::dvector![1.0, 2.0];
        let b = nalgebra::dvector![3.0];
        assert_eq!(concat(&a, &b), nalgebra::dvector![1.0, 2.0, 3.0]);
    }
}
