use crate::geom::GeomError;
use crate::math::clip01;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// A deterministic map from the unit hypercube `[0, 1]^d` onto the simplex
/// spanned by `d + 1` ordered vertices.
///
/// For `d = 1` it is linear interpolation between the two vertices. For
/// `d > 1` it accumulates, starting from the first vertex, the terms
/// `(Π_{j=1}^{i} u_{d-j}^{1/(d-j+1)}) · (v_i − v_{i-1})` for `i = 1..d`, with
/// the hypercube coordinates clamped to `[0, 1]`. Pushing a uniform
/// distribution on the hypercube through this map yields a uniform
/// distribution on the simplex, which is why it serves both as the change of
/// variables inside the simplicial cubature and as the sampling map of the
/// per-simplex rejection sampler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimplexTransform {
    vertices: Vec<DVector<f64>>,
}

impl SimplexTransform {
    /// Creates the transform onto the simplex with the given ordered vertices.
    /// Requires `d + 1` vertices of dimension `d ≥ 1`.
    pub fn new(vertices: Vec<DVector<f64>>) -> Result<Self, GeomError> {
        let dim = match vertices.first() {
            Some(v) if v.len() > 0 => v.len(),
            _ => {
                return Err(GeomError::InvalidSimplex {
                    msg: "a simplex needs at least one vertex of dimension >= 1",
                })
            }
        };
        if vertices.len() != dim + 1 {
            return Err(GeomError::InvalidSimplex {
                msg: "a d-dimensional simplex needs d + 1 vertices",
            });
        }
        if vertices.iter().any(|v| v.len() != dim) {
            return Err(GeomError::InvalidSimplex {
                msg: "all vertices must share the same dimension",
            });
        }
        Ok(Self { vertices })
    }

    /// The simplex (and hypercube) dimension.
    pub fn dim(&self) -> usize {
        self.vertices[0].len()
    }

    /// The ordered vertices.
    pub fn vertices(&self) -> &[DVector<f64>] {
        &self.vertices
    }

    /// Maps a hypercube point onto the simplex. Coordinates outside `[0, 1]`
    /// are clamped.
    pub fn apply(&self, u: &DVector<f64>) -> Result<DVector<f64>, GeomError> {
        let dim = self.dim();
        if u.len() != dim {
            return Err(GeomError::DimensionMismatch {
                expected: dim,
                got: u.len(),
            });
        }
        let mut result = self.vertices[0].clone();
        if dim == 1 {
            result += clip01(u[0]) * (&self.vertices[1] - &self.vertices[0]);
            return Ok(result);
        }
        let mut prod = 1.0;
        for i in 1..=dim {
            // Factor for j = i of the running product over j = 1..=i.
            prod *= clip01(u[dim - i]).powf(1.0 / (dim - i + 1) as f64);
            result += prod * (&self.vertices[i] - &self.vertices[i - 1]);
        }
        Ok(result)
    }

    /// The simplex volume, `|det(v_1 − v_0, …, v_d − v_0)| / d!`.
    pub fn volume(&self) -> f64 {
        let dim = self.dim();
        let edges = DMatrix::from_fn(dim, dim, |row, col| {
            self.vertices[col + 1][row] - self.vertices[0][row]
        });
        let mut factorial = 1.0;
        for k in 2..=dim {
            factorial *= k as f64;
        }
        edges.determinant().abs() / factorial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn unit_triangle() -> SimplexTransform {
        SimplexTransform::new(vec![
            dvector![0.0, 0.0],
            dvector![1.0, 0.0],
            dvector![0.0, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_linear_interpolation_1d() {
        let transform =
            SimplexTransform::new(vec![dvector![2.0], dvector![4.0]]).unwrap();
        assert_abs_diff_eq!(transform.apply(&dvector![0.0]).unwrap()[0], 2.0);
        assert_abs_diff_eq!(transform.apply(&dvector![0.5]).unwrap()[0], 3.0);
        // Out-of-cube coordinates are clamped.
        assert_abs_diff_eq!(transform.apply(&dvector![7.0]).unwrap()[0], 4.0);
    }

    #[test]
    fn test_image_stays_in_simplex() {
        let transform = unit_triangle();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..500 {
            let u = dvector![rng.random::<f64>(), rng.random::<f64>()];
            let x = transform.apply(&u).unwrap();
            assert!(x[0] >= -1e-12);
            assert!(x[1] >= -1e-12);
            assert!(x[0] + x[1] <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_uniform_pushforward_mean() {
        // The barycenter of the unit triangle is (1/3, 1/3).
        let transform = unit_triangle();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let n = 40_000;
        let mut mean = dvector![0.0, 0.0];
        for _ in 0..n {
            let u = dvector![rng.random::<f64>(), rng.random::<f64>()];
            mean += transform.apply(&u).unwrap();
        }
        mean /= n as f64;
        assert_abs_diff_eq!(mean[0], 1.0 / 3.0, epsilon = 5e-3);
        assert_abs_diff_eq!(mean[1], 1.0 / 3.0, epsilon = 5e-3);
    }

    #[test]
    fn test_volume() {
        assert_abs_diff_eq!(unit_triangle().volume(), 0.5);
        let segment =
            SimplexTransform::new(vec![dvector![1.0], dvector![3.5]]).unwrap();
        assert_abs_diff_eq!(segment.volume(), 2.5);
    }

    #[test]
    fn test_vertex_count_validation() {
        assert!(SimplexTransform::new(vec![dvector![0.0, 0.0], dvector![1.0, 0.0]]).is_err());
    }
}
