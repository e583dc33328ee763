//! Bounded maximization capability.
//!
//! The truncated distributions need a global bound on a density over a
//! simplex; they obtain it by maximizing the density composed with the
//! hypercube-to-simplex transform over the unit hypercube. The [`Optimizer`]
//! trait keeps that solver a black box; [`CompassSearch`] is the bundled
//! derivative-free default, a multistart coordinate pattern search.

use crate::geom::Interval;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Errors associated with the [`optim`](crate::optim) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum OptimError {
    #[error("objective dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("the feasible region is empty")]
    EmptyBounds,

    #[error("invalid optimizer settings: {msg}")]
    InvalidSettings { msg: &'static str },
}

/// A scalar objective function.
pub trait Objective: Sync {
    /// Input dimension.
    fn dim(&self) -> usize;

    /// Evaluates the objective.
    fn eval(&self, x: &DVector<f64>) -> f64;
}

/// Adapter turning a closure into an [`Objective`].
pub struct FnObjective<F> {
    dim: usize,
    f: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&DVector<f64>) -> f64 + Sync,
{
    /// Wraps `f` with the given input dimension.
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&DVector<f64>) -> f64 + Sync,
{
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &DVector<f64>) -> f64 {
        (self.f)(x)
    }
}

/// Black-box bounded maximizer.
pub trait Optimizer: Debug + Send + Sync {
    /// Returns the argmax and the maximum of `objective` over `bounds`.
    fn maximize(
        &self,
        objective: &dyn Objective,
        bounds: &Interval,
    ) -> Result<(DVector<f64>, f64), OptimError>;

    /// Clones the optimizer behind the trait object.
    fn boxed_clone(&self) -> Box<dyn Optimizer>;
}

impl Clone for Box<dyn Optimizer> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Derivative-free multistart coordinate pattern search.
///
/// Starts from the centers of a regular grid of sub-boxes, repeatedly probes
/// `± step` along every axis (clamped to the bounds), moves to the best
/// improving probe and halves the step otherwise, until the step drops below
/// `tolerance` times the largest axis extent. The multistart grid is what
/// makes the search global rather than boundary-local, which matters because
/// the returned value is used as a rejection-sampling envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompassSearch {
    /// Starting points per axis.
    pub starts_per_axis: usize,
    /// Relative step tolerance terminating each local search.
    pub tolerance: f64,
    /// Hard cap on probe rounds per start.
    pub max_iterations: usize,
}

impl Default for CompassSearch {
    fn default() -> Self {
        Self {
            starts_per_axis: 3,
            tolerance: 1e-9,
            max_iterations: 10_000,
        }
    }
}

impl CompassSearch {
    fn local_search(
        &self,
        objective: &dyn Objective,
        bounds: &Interval,
        start: DVector<f64>,
        extent: f64,
    ) -> (DVector<f64>, f64) {
        let dim = start.len();
        let mut best = start;
        let mut best_value = objective.eval(&best);
        let mut step = 0.25 * extent;
        let mut iterations = 0;

        while step > self.tolerance * extent && iterations < self.max_iterations {
            iterations += 1;
            let mut improved = false;
            for axis in 0..dim {
                for direction in [1.0, -1.0] {
                    let mut probe = best.clone();
                    probe[axis] = (probe[axis] + direction * step)
                        .clamp(bounds.lower()[axis], bounds.upper()[axis]);
                    let value = objective.eval(&probe);
                    if value > best_value {
                        best = probe;
                        best_value = value;
                        improved = true;
                    }
                }
            }
            if !improved {
                step *= 0.5;
            }
        }
        (best, best_value)
    }
}

impl Optimizer for CompassSearch {
    fn maximize(
        &self,
        objective: &dyn Objective,
        bounds: &Interval,
    ) -> Result<(DVector<f64>, f64), OptimError> {
        if self.starts_per_axis == 0 {
            return Err(OptimError::InvalidSettings {
                msg: "starts_per_axis must be positive",
            });
        }
        let dim = bounds.dim();
        if objective.dim() != dim {
            return Err(OptimError::DimensionMismatch {
                expected: dim,
                got: objective.dim(),
            });
        }
        if bounds.is_empty() {
            return Err(OptimError::EmptyBounds);
        }
        let extent = bounds
            .upper()
            .iter()
            .zip(bounds.lower().iter())
            .map(|(u, l)| u - l)
            .fold(0.0_f64, f64::max)
            .max(f64::MIN_POSITIVE);

        let mut best: Option<(DVector<f64>, f64)> = None;
        for index in crate::math::GridIndices::new(&vec![self.starts_per_axis; dim]) {
            let start = DVector::from_fn(dim, |axis, _| {
                let width = bounds.upper()[axis] - bounds.lower()[axis];
                bounds.lower()[axis]
                    + width * (index[axis] as f64 + 0.5) / self.starts_per_axis as f64
            });
            let (argmax, value) = self.local_search(objective, bounds, start, extent);
            if best.as_ref().map_or(true, |(_, v)| value > *v) {
                best = Some((argmax, value));
            }
        }
        best.ok_or(OptimError::EmptyBounds)
    }

    fn boxed_clone(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn test_interior_maximum_1d() {
        let objective = FnObjective::new(1, |x: &DVector<f64>| -(x[0] - 0.3).powi(2));
        let (argmax, value) = CompassSearch::default()
            .maximize(&objective, &Interval::univariate(0.0, 1.0))
            .unwrap();
        assert_abs_diff_eq!(argmax[0], 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(value, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_boundary_maximum() {
        let objective = FnObjective::new(1, |x: &DVector<f64>| x[0]);
        let (argmax, _) = CompassSearch::default()
            .maximize(&objective, &Interval::univariate(-2.0, 5.0))
            .unwrap();
        assert_abs_diff_eq!(argmax[0], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_multimodal_2d() {
        // Two bumps; the taller one is off-center.
        let objective = FnObjective::new(2, |x: &DVector<f64>| {
            let a = -((x[0] - 0.8).powi(2) + (x[1] - 0.8).powi(2)) * 40.0;
            let b = -((x[0] - 0.2).powi(2) + (x[1] - 0.2).powi(2)) * 40.0;
            a.exp() * 2.0 + b.exp()
        });
        let bounds = Interval::new(dvector![0.0, 0.0], dvector![1.0, 1.0]).unwrap();
        let (argmax, value) = CompassSearch::default()
            .maximize(&objective, &bounds)
            .unwrap();
        assert_abs_diff_eq!(argmax[0], 0.8, epsilon = 1e-4);
        assert_abs_diff_eq!(argmax[1], 0.8, epsilon = 1e-4);
        assert_abs_diff_eq!(value, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_bounds_rejected() {
        let objective = FnObjective::new(1, |x: &DVector<f64>| x[0]);
        assert!(matches!(
            CompassSearch::default().maximize(&objective, &Interval::univariate(1.0, 0.0)),
            Err(OptimError::EmptyBounds)
        ));
    }
}
