use crate::geom::{Interval, MeshDomain};
use crate::math::GridIndices;
use crate::numint::{Integrand, Integrator, NumIntError};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Nodes and weights of the `n`-point Gauss–Legendre rule on `[-1, 1]`,
/// computed by Newton iteration on the Legendre polynomial `P_n`.
pub fn gauss_legendre_rule(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for k in 0..n {
        // Tricomi initial guess for the k-th root.
        let mut x = (PI * (k as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 0.0;
        for _ in 0..100 {
            // Evaluate P_n and P_n' by the three-term recurrence.
            let mut p0 = 1.0;
            let mut p1 = x;
            for j in 2..=n {
                let p2 = ((2 * j - 1) as f64 * x * p1 - (j - 1) as f64 * p0) / j as f64;
                p0 = p1;
                p1 = p2;
            }
            dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
            let delta = p1 / dp;
            x -= delta;
            if delta.abs() < 1e-15 {
                break;
            }
        }
        nodes[k] = x;
        weights[k] = 2.0 / ((1.0 - x * x) * dp * dp);
    }
    (nodes, weights)
}

/// Tensorized Gauss–Legendre product rule over an axis-aligned interval.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaussLegendre {
    nodes_per_axis: Vec<usize>,
}

impl GaussLegendre {
    /// Creates a rule with an explicit node count per axis.
    pub fn new(nodes_per_axis: Vec<usize>) -> Result<Self, NumIntError> {
        if nodes_per_axis.is_empty() || nodes_per_axis.iter().any(|&n| n == 0) {
            return Err(NumIntError::InvalidNodes {
                msg: "every axis needs at least one node",
            });
        }
        Ok(Self { nodes_per_axis })
    }

    /// Creates a rule with `nodes` nodes on each of `dim` axes.
    pub fn uniform(dim: usize, nodes: usize) -> Result<Self, NumIntError> {
        Self::new(vec![nodes; dim.max(1)])
    }

    /// The node counts per axis.
    pub fn nodes_per_axis(&self) -> &[usize] {
        &self.nodes_per_axis
    }
}

impl Integrator for GaussLegendre {
    fn integrate_over_interval(
        &self,
        f: &dyn Integrand,
        interval: &Interval,
    ) -> Result<Vec<f64>, NumIntError> {
        let dim = self.nodes_per_axis.len();
        if interval.dim() != dim {
            return Err(NumIntError::DimensionMismatch {
                expected: dim,
                got: interval.dim(),
            });
        }
        if f.input_dim() != dim {
            return Err(NumIntError::DimensionMismatch {
                expected: dim,
                got: f.input_dim(),
            });
        }
        if interval.is_empty() {
            return Ok(vec![0.0; f.output_dim()]);
        }

        // Per-axis nodes mapped onto [a_i, b_i], weights scaled by the
        // half-width of each axis.
        let rules: Vec<(Vec<f64>, Vec<f64>)> = self
            .nodes_per_axis
            .iter()
            .enumerate()
            .map(|(axis, &n)| {
                let (t, w) = gauss_legendre_rule(n);
                let (a, b) = (interval.lower()[axis], interval.upper()[axis]);
                let half = 0.5 * (b - a);
                let mid = 0.5 * (a + b);
                (
                    t.iter().map(|&t| mid + half * t).collect(),
                    w.iter().map(|&w| w * half).collect(),
                )
            })
            .collect();

        let mut total = DVector::zeros(f.output_dim());
        let mut point = DVector::zeros(dim);
        for index in GridIndices::new(&self.nodes_per_axis) {
            let mut weight = 1.0;
            for (axis, &i) in index.iter().enumerate() {
                point[axis] = rules[axis].0[i];
                weight *= rules[axis].1[i];
            }
            total += weight * f.eval(&point);
        }
        Ok(total.iter().copied().collect())
    }

    fn integrate_over_mesh(
        &self,
        _f: &dyn Integrand,
        _mesh: &dyn MeshDomain,
    ) -> Result<Vec<f64>, NumIntError> {
        Err(NumIntError::UnsupportedDomain {
            name: "GaussLegendre",
        })
    }

    fn supports_mesh(&self, _dim: usize) -> bool {
        false
    }
}
