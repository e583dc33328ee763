use crate::geom::{GeomError, Interval};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Barycentric containment tolerance.
const CONTAINS_EPS: f64 = 1e-10;

/// Minimal read-only view over a polytopal mesh, the geometric collaborator of
/// the truncated distributions.
pub trait MeshDomain: Debug + Send + Sync {
    /// Coordinate dimension of the mesh.
    fn dim(&self) -> usize;

    /// Number of simplices in the mesh.
    fn simplex_count(&self) -> usize;

    /// Ordered vertex set of the `index`-th simplex.
    fn vertices_of(&self, index: usize) -> Result<Vec<DVector<f64>>, GeomError>;

    /// Axis-aligned bounding interval of the whole mesh.
    fn bounding_interval(&self) -> Interval;

    /// Whether the closed mesh domain contains `point`.
    fn contains(&self, point: &DVector<f64>) -> bool;

    /// Restriction of the mesh to an axis-aligned interval. Implementations
    /// may report [`GeomError::UnsupportedIntersection`] when an exact
    /// restriction is not available for their dimension; callers then fall
    /// back to generic quadrature.
    fn intersect(&self, interval: &Interval) -> Result<SimplicialMesh, GeomError>;

    /// Clones the mesh behind the trait object.
    fn boxed_clone(&self) -> Box<dyn MeshDomain>;
}

impl Clone for Box<dyn MeshDomain> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// A mesh given by an explicit vertex list and per-simplex vertex indices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimplicialMesh {
    dim: usize,
    vertices: Vec<DVector<f64>>,
    simplices: Vec<Vec<usize>>,
}

impl SimplicialMesh {
    /// Creates a mesh from vertices and simplex index lists. Every simplex
    /// must reference `dim + 1` distinct existing vertices.
    pub fn new(
        vertices: Vec<DVector<f64>>,
        simplices: Vec<Vec<usize>>,
    ) -> Result<Self, GeomError> {
        let dim = match vertices.first() {
            Some(v) if v.len() > 0 => v.len(),
            _ => {
                return Err(GeomError::InvalidMesh {
                    msg: "a mesh needs at least one vertex of dimension >= 1",
                })
            }
        };
        if vertices.iter().any(|v| v.len() != dim) {
            return Err(GeomError::InvalidMesh {
                msg: "all vertices must share the same dimension",
            });
        }
        for simplex in &simplices {
            if simplex.len() != dim + 1 {
                return Err(GeomError::InvalidMesh {
                    msg: "every simplex must have dim + 1 vertices",
                });
            }
            if simplex.iter().any(|&v| v >= vertices.len()) {
                return Err(GeomError::InvalidMesh {
                    msg: "simplex references a vertex out of range",
                });
            }
            if simplex.iter().unique().count() != simplex.len() {
                return Err(GeomError::InvalidMesh {
                    msg: "simplex vertices must be distinct",
                });
            }
        }
        Ok(Self {
            dim,
            vertices,
            simplices,
        })
    }

    /// Regular one-dimensional mesh of `cells` equal segments over `[a, b]`.
    pub fn regular_1d(a: f64, b: f64, cells: usize) -> Result<Self, GeomError> {
        if !(a < b) || cells == 0 {
            return Err(GeomError::InvalidMesh {
                msg: "regular_1d needs a < b and at least one cell",
            });
        }
        let step = (b - a) / cells as f64;
        let vertices = (0..=cells)
            .map(|k| DVector::from_element(1, a + step * k as f64))
            .collect();
        let simplices = (0..cells).map(|k| vec![k, k + 1]).collect();
        Self::new(vertices, simplices)
    }

    /// Barycentric coordinates of `point` with respect to one simplex, or
    /// `None` when the simplex is degenerate.
    fn barycentric(&self, simplex: &[usize], point: &DVector<f64>) -> Option<DVector<f64>> {
        let v0 = &self.vertices[simplex[0]];
        let edges = DMatrix::from_fn(self.dim, self.dim, |row, col| {
            self.vertices[simplex[col + 1]][row] - v0[row]
        });
        edges.lu().solve(&(point - v0))
    }
}

impl MeshDomain for SimplicialMesh {
    fn dim(&self) -> usize {
        self.dim
    }

    fn simplex_count(&self) -> usize {
        self.simplices.len()
    }

    fn vertices_of(&self, index: usize) -> Result<Vec<DVector<f64>>, GeomError> {
        let simplex = self
            .simplices
            .get(index)
            .ok_or(GeomError::InvalidSimplex {
                msg: "simplex index out of range",
            })?;
        Ok(simplex.iter().map(|&v| self.vertices[v].clone()).collect())
    }

    fn bounding_interval(&self) -> Interval {
        let mut lower = DVector::from_element(self.dim, f64::MAX);
        let mut upper = DVector::from_element(self.dim, f64::MIN);
        for simplex in &self.simplices {
            for &v in simplex {
                lower = lower.zip_map(&self.vertices[v], f64::min);
                upper = upper.zip_map(&self.vertices[v], f64::max);
            }
        }
        // A mesh without simplices yields an empty (lower > upper) interval.
        Interval::new(lower, upper).expect("vertex coordinates are finite")
    }

    fn contains(&self, point: &DVector<f64>) -> bool {
        if point.len() != self.dim {
            return false;
        }
        self.simplices.iter().any(|simplex| {
            match self.barycentric(simplex, point) {
                Some(lambda) => {
                    lambda.iter().all(|&l| l >= -CONTAINS_EPS)
                        && lambda.sum() <= 1.0 + CONTAINS_EPS
                }
                None => false,
            }
        })
    }

    fn intersect(&self, interval: &Interval) -> Result<SimplicialMesh, GeomError> {
        if interval.dim() != self.dim {
            return Err(GeomError::DimensionMismatch {
                expected: self.dim,
                got: interval.dim(),
            });
        }
        if self.dim == 1 {
            // Exact segment clipping.
            let (a, b) = (interval.lower()[0], interval.upper()[0]);
            let mut vertices = Vec::new();
            let mut simplices = Vec::new();
            for simplex in &self.simplices {
                let (x0, x1) = (self.vertices[simplex[0]][0], self.vertices[simplex[1]][0]);
                let lo = x0.min(x1).max(a);
                let hi = x0.max(x1).min(b);
                if lo < hi {
                    vertices.push(DVector::from_element(1, lo));
                    vertices.push(DVector::from_element(1, hi));
                    simplices.push(vec![vertices.len() - 2, vertices.len() - 1]);
                }
            }
            if vertices.is_empty() {
                // Empty restriction, kept representable as a zero-length cell.
                vertices.push(DVector::from_element(1, a));
                vertices.push(DVector::from_element(1, a));
                simplices.push(vec![0, 1]);
            }
            return SimplicialMesh::new(vertices, simplices);
        }
        // In higher dimension only the trivial cases are handled: simplices
        // entirely inside are kept, entirely outside are dropped, anything
        // partially overlapping makes the restriction unsupported.
        let mut vertices = Vec::new();
        let mut simplices = Vec::new();
        for simplex in &self.simplices {
            let inside = simplex
                .iter()
                .filter(|&&v| interval.contains(&self.vertices[v]))
                .count();
            if inside == simplex.len() {
                let base = vertices.len();
                vertices.extend(simplex.iter().map(|&v| self.vertices[v].clone()));
                simplices.push((base..base + simplex.len()).collect());
            } else if inside > 0 {
                return Err(GeomError::UnsupportedIntersection { dim: self.dim });
            }
        }
        if simplices.is_empty() {
            return Err(GeomError::UnsupportedIntersection { dim: self.dim });
        }
        SimplicialMesh::new(vertices, simplices)
    }

    fn boxed_clone(&self) -> Box<dyn MeshDomain> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    fn two_triangles() -> SimplicialMesh {
        // The unit square split along its diagonal.
        SimplicialMesh::new(
            vec![
                dvector![0.0, 0.0],
                dvector![1.0, 0.0],
                dvector![1.0, 1.0],
                dvector![0.0, 1.0],
            ],
            vec![vec![0, 1, 2], vec![0, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn test_regular_1d() {
        let mesh = SimplicialMesh::regular_1d(0.0, 1.0, 4).unwrap();
        assert_eq!(mesh.simplex_count(), 4);
        let cell = mesh.vertices_of(2).unwrap();
        assert_abs_diff_eq!(cell[0][0], 0.5);
        assert_abs_diff_eq!(cell[1][0], 0.75);
        assert!(mesh.contains(&dvector![0.3]));
        assert!(!mesh.contains(&dvector![1.3]));
    }

    #[test]
    fn test_contains_2d() {
        let mesh = two_triangles();
        assert!(mesh.contains(&dvector![0.2, 0.7]));
        assert!(mesh.contains(&dvector![0.9, 0.1]));
        assert!(mesh.contains(&dvector![1.0, 1.0]));
        assert!(!mesh.contains(&dvector![1.2, 0.5]));
        assert!(!mesh.contains(&dvector![-0.1, 0.5]));
    }

    #[test]
    fn test_bounding_interval() {
        let bounds = two_triangles().bounding_interval();
        assert_eq!(bounds.lower(), &dvector![0.0, 0.0]);
        assert_eq!(bounds.upper(), &dvector![1.0, 1.0]);
    }

    #[test]
    fn test_intersect_1d_clips_segments() {
        let mesh = SimplicialMesh::regular_1d(0.0, 1.0, 2).unwrap();
        let clipped = mesh.intersect(&Interval::univariate(0.25, 0.6)).unwrap();
        let total: f64 = (0..clipped.simplex_count())
            .map(|i| {
                let v = clipped.vertices_of(i).unwrap();
                (v[1][0] - v[0][0]).abs()
            })
            .sum();
        assert_abs_diff_eq!(total, 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_intersect_2d_partial_overlap_unsupported() {
        let mesh = two_triangles();
        let err = mesh
            .intersect(&Interval::new(dvector![0.0, 0.0], dvector![0.5, 0.5]).unwrap())
            .unwrap_err();
        assert!(matches!(err, GeomError::UnsupportedIntersection { dim: 2 }));
    }

    #[test]
    fn test_invalid_mesh_rejected() {
        assert!(SimplicialMesh::new(vec![dvector![0.0]], vec![vec![0, 0]]).is_err());
        assert!(SimplicialMesh::new(vec![dvector![0.0]], vec![vec![0, 1]]).is_err());
    }
}
