use crate::geom::{Interval, MeshDomain, SimplexTransform};
use crate::math::GridIndices;
use crate::numint::{gauss_legendre_rule, Integrand, Integrator, NumIntError};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Cubature over simplicial meshes.
///
/// Each simplex is integrated through the hypercube change of variables of
/// [`SimplexTransform`]: since the transform pushes the uniform distribution
/// on `[0, 1]^d` onto the uniform distribution on the simplex, its Jacobian
/// determinant is the constant simplex volume and
/// `∫_S f = vol(S) · ∫_{[0,1]^d} f(T(u)) du`, evaluated by a tensorized
/// Gauss–Legendre rule. Simplices are processed in parallel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimplicialCubature {
    nodes_per_axis: usize,
}

impl SimplicialCubature {
    /// Creates a cubature with the given hypercube node count per axis.
    pub fn new(nodes_per_axis: usize) -> Result<Self, NumIntError> {
        if nodes_per_axis == 0 {
            return Err(NumIntError::InvalidNodes {
                msg: "every axis needs at least one node",
            });
        }
        Ok(Self { nodes_per_axis })
    }

    /// The hypercube node count per axis.
    pub fn nodes_per_axis(&self) -> usize {
        self.nodes_per_axis
    }

    /// Integrates `f` over a single simplex given by its ordered vertices.
    pub fn integrate_simplex(
        &self,
        f: &dyn Integrand,
        vertices: Vec<DVector<f64>>,
    ) -> Result<Vec<f64>, NumIntError> {
        let transform = SimplexTransform::new(vertices)?;
        let dim = transform.dim();
        if f.input_dim() != dim {
            return Err(NumIntError::DimensionMismatch {
                expected: dim,
                got: f.input_dim(),
            });
        }
        let volume = transform.volume();
        if volume == 0.0 {
            return Ok(vec![0.0; f.output_dim()]);
        }

        // Nodes and weights on [0, 1].
        let (t, w) = gauss_legendre_rule(self.nodes_per_axis);
        let nodes: Vec<f64> = t.iter().map(|&t| 0.5 * (t + 1.0)).collect();
        let weights: Vec<f64> = w.iter().map(|&w| 0.5 * w).collect();

        let mut total = DVector::zeros(f.output_dim());
        let mut u = DVector::zeros(dim);
        for index in GridIndices::new(&vec![self.nodes_per_axis; dim]) {
            let mut weight = 1.0;
            for (axis, &i) in index.iter().enumerate() {
                u[axis] = nodes[i];
                weight *= weights[i];
            }
            total += weight * f.eval(&transform.apply(&u)?);
        }
        total *= volume;
        Ok(total.iter().copied().collect())
    }
}

impl Integrator for SimplicialCubature {
    fn integrate_over_interval(
        &self,
        _f: &dyn Integrand,
        _interval: &Interval,
    ) -> Result<Vec<f64>, NumIntError> {
        Err(NumIntError::UnsupportedDomain {
            name: "SimplicialCubature",
        })
    }

    fn integrate_over_mesh(
        &self,
        f: &dyn Integrand,
        mesh: &dyn MeshDomain,
    ) -> Result<Vec<f64>, NumIntError> {
        if f.input_dim() != mesh.dim() {
            return Err(NumIntError::DimensionMismatch {
                expected: mesh.dim(),
                got: f.input_dim(),
            });
        }
        let per_simplex: Vec<Vec<f64>> = (0..mesh.simplex_count())
            .into_par_iter()
            .map(|i| self.integrate_simplex(f, mesh.vertices_of(i)?))
            .collect::<Result<_, _>>()?;

        let mut total = vec![0.0; f.output_dim()];
        for partial in &per_simplex {
            for (acc, v) in total.iter_mut().zip(partial.iter()) {
                *acc += v;
            }
        }
        Ok(total)
    }

    fn supports_mesh(&self, _dim: usize) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::SimplicialMesh;
    use crate::numint::FnIntegrand;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn test_constant_over_triangles_is_area() {
        let mesh = SimplicialMesh::new(
            vec![
                dvector![0.0, 0.0],
                dvector![1.0, 0.0],
                dvector![1.0, 1.0],
                dvector![0.0, 1.0],
            ],
            vec![vec![0, 1, 2], vec![0, 2, 3]],
        )
        .unwrap();
        let cubature = SimplicialCubature::new(16).unwrap();
        let one = FnIntegrand::new(2, 1, |_: &DVector<f64>| dvector![1.0]);
        let result = cubature.integrate_over_mesh(&one, &mesh).unwrap();
        assert_abs_diff_eq!(result[0], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_identity_over_segment_mesh() {
        let mesh = SimplicialMesh::regular_1d(0.0, 1.0, 3).unwrap();
        let cubature = SimplicialCubature::new(8).unwrap();
        let f = FnIntegrand::new(1, 1, |x: &DVector<f64>| dvector![x[0]]);
        let result = cubature.integrate_over_mesh(&f, &mesh).unwrap();
        assert_abs_diff_eq!(result[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_over_triangle() {
        // ∫ x over the unit triangle {x, y >= 0, x + y <= 1} equals 1/6.
        let mesh = SimplicialMesh::new(
            vec![dvector![0.0, 0.0], dvector![1.0, 0.0], dvector![0.0, 1.0]],
            vec![vec![0, 1, 2]],
        )
        .unwrap();
        let cubature = SimplicialCubature::new(32).unwrap();
        let f = FnIntegrand::new(2, 1, |x: &DVector<f64>| dvector![x[0]]);
        let result = cubature.integrate_over_mesh(&f, &mesh).unwrap();
        assert_abs_diff_eq!(result[0], 1.0 / 6.0, epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_simplex_contributes_nothing() {
        let cubature = SimplicialCubature::new(4).unwrap();
        let f = FnIntegrand::new(1, 1, |_: &DVector<f64>| dvector![1.0]);
        let result = cubature
            .integrate_simplex(&f, vec![dvector![2.0], dvector![2.0]])
            .unwrap();
        assert_eq!(result[0], 0.0);
    }
}
