use crate::dist::generic::quadrature_for;
use crate::dist::{check_indices, check_point, DistError, Distribution, GenericMarginal};
use crate::geom::{GeomError, Interval, MeshDomain, SimplexTransform};
use crate::math::nodes_per_axis;
use crate::numint::{FnIntegrand, Integrator, SimplicialCubature};
use crate::optim::{CompassSearch, FnObjective, Optimizer};
use log::warn;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, RngCore};
use rand_distr::weighted::WeightedAliasIndex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::OnceLock;

/// Rejection-sampling attempts between progress warnings.
const REJECTION_WARN_INTERVAL: usize = 150;

/// Tuning knobs of [`MeshTruncated`], bundled so that a truncation can be
/// reproduced from a serialized configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruncationConfig {
    /// Sample by global rejection over the mesh bounding box instead of the
    /// per-simplex selector.
    pub use_rejection_sampling: bool,
    /// Hard cap on the total tensor node count of any single quadrature.
    pub max_integration_nodes: usize,
    /// Requested hypercube nodes per axis for the per-simplex cubatures.
    pub marginal_integration_nodes: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            use_rejection_sampling: false,
            max_integration_nodes: 16_384,
            marginal_integration_nodes: 64,
        }
    }
}

/// Structural mesh equality through the [`MeshDomain`] view.
fn same_mesh(a: &dyn MeshDomain, b: &dyn MeshDomain) -> bool {
    a.dim() == b.dim()
        && a.simplex_count() == b.simplex_count()
        && (0..a.simplex_count()).all(|k| match (a.vertices_of(k), b.vertices_of(k)) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        })
}

/// A continuous distribution restricted to a simplicial mesh and
/// renormalized.
///
/// The density is `pdf(x) = base(x) / P(base ∈ mesh)` inside the mesh and
/// zero outside. Construction integrates the base density over every simplex
/// by hypercube cubature; a mesh carrying no base mass is rejected. Sampling
/// either draws a simplex from the per-simplex mass selector and rejects
/// within it, or (under [`TruncationConfig::use_rejection_sampling`]) draws
/// from the base distribution until the mesh contains the draw.
#[derive(Clone, Debug)]
pub struct MeshTruncated {
    base: Box<dyn Distribution>,
    mesh: Box<dyn MeshDomain>,
    config: TruncationConfig,
    optimizer: Box<dyn Optimizer>,
    cubature: SimplicialCubature,
    weights: Vec<f64>,
    normalization: f64,
    sups: Vec<f64>,
    selector: Option<WeightedAliasIndex<f64>>,
    range: Interval,
    mean_cache: OnceLock<DVector<f64>>,
    cov_cache: OnceLock<DMatrix<f64>>,
}

impl MeshTruncated {
    /// Truncates `base` over `mesh` with explicit configuration and density
    /// maximizer. The base must be continuous and share the mesh dimension.
    pub fn new(
        base: Box<dyn Distribution>,
        mesh: Box<dyn MeshDomain>,
        config: TruncationConfig,
        optimizer: Box<dyn Optimizer>,
    ) -> Result<Self, DistError> {
        if !base.is_continuous() {
            return Err(DistError::NotContinuous {
                name: "mesh truncation",
            });
        }
        if base.dim() != mesh.dim() {
            return Err(DistError::DimensionMismatch {
                expected: mesh.dim(),
                got: base.dim(),
            });
        }
        let range = mesh.bounding_interval().intersect(&base.range())?;
        let mut truncated = Self {
            base,
            mesh,
            config,
            optimizer,
            cubature: SimplicialCubature::new(1)?,
            weights: Vec::new(),
            normalization: 0.0,
            sups: Vec::new(),
            selector: None,
            range,
            mean_cache: OnceLock::new(),
            cov_cache: OnceLock::new(),
        };
        truncated.rebind()?;
        Ok(truncated)
    }

    /// Truncates with the default configuration and the bundled
    /// [`CompassSearch`] maximizer.
    pub fn with_defaults(
        base: Box<dyn Distribution>,
        mesh: Box<dyn MeshDomain>,
    ) -> Result<Self, DistError> {
        Self::new(
            base,
            mesh,
            TruncationConfig::default(),
            Box::new(CompassSearch::default()),
        )
    }

    /// The base distribution.
    pub fn base(&self) -> &dyn Distribution {
        self.base.as_ref()
    }

    /// The truncation mesh.
    pub fn mesh(&self) -> &dyn MeshDomain {
        self.mesh.as_ref()
    }

    /// The active configuration.
    pub fn config(&self) -> &TruncationConfig {
        &self.config
    }

    /// The normalization constant `1 / P(base ∈ mesh)`.
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// Normalized per-simplex probability masses.
    pub fn simplex_weights(&self) -> &[f64] {
        &self.weights
    }

    /// Hypercube cubature nodes per axis after budget clipping.
    pub fn cubature_nodes_per_axis(&self) -> usize {
        self.cubature.nodes_per_axis()
    }

    /// Replaces the mesh and rebinds all derived state.
    pub fn set_mesh(&mut self, mesh: Box<dyn MeshDomain>) -> Result<(), DistError> {
        if mesh.dim() != self.base.dim() {
            return Err(DistError::DimensionMismatch {
                expected: self.base.dim(),
                got: mesh.dim(),
            });
        }
        self.mesh = mesh;
        self.rebind()
    }

    /// Recomputes everything derived from the base/mesh/config triple:
    /// cubature resolution, per-simplex masses and density bounds, the
    /// normalization constant, the discrete simplex selector and the numeric
    /// range. Cached moments are discarded.
    fn rebind(&mut self) -> Result<(), DistError> {
        let dim = self.base.dim();

        let requested = self.config.marginal_integration_nodes.max(1);
        let per_axis = match requested.checked_pow(dim as u32) {
            Some(total) if total <= self.config.max_integration_nodes => requested,
            _ => {
                let capped = nodes_per_axis(self.config.max_integration_nodes, dim)
                    .clamp(1, requested);
                warn!(
                    "clipping cubature nodes from {} to {} per axis to stay within {} total nodes",
                    requested, capped, self.config.max_integration_nodes
                );
                capped
            }
        };
        self.cubature = SimplicialCubature::new(per_axis)?;

        let base = self.base.as_ref();
        let mesh = self.mesh.as_ref();
        let pdf = FnIntegrand::new(dim, 1, |x: &DVector<f64>| {
            DVector::from_element(1, base.pdf(x).unwrap_or(0.0))
        });

        let mut masses = Vec::with_capacity(mesh.simplex_count());
        for k in 0..mesh.simplex_count() {
            let mass = self.cubature.integrate_simplex(&pdf, mesh.vertices_of(k)?)?[0];
            masses.push(mass.max(0.0));
        }
        let total: f64 = masses.iter().sum();
        if !(total > 0.0) {
            return Err(DistError::ZeroMeshMass);
        }

        // Per-simplex density bounds, maximized over the unit hypercube
        // through the simplex transform. They are the rejection envelopes of
        // the per-simplex sampler; global rejection needs neither them nor
        // the discrete selector.
        let mut sups = Vec::new();
        if !self.config.use_rejection_sampling {
            let unit_cube = Interval::new(DVector::zeros(dim), DVector::from_element(dim, 1.0))?;
            sups.reserve(mesh.simplex_count());
            for k in 0..mesh.simplex_count() {
                let transform = SimplexTransform::new(mesh.vertices_of(k)?)?;
                if transform.volume() == 0.0 {
                    sups.push(0.0);
                    continue;
                }
                let objective = FnObjective::new(dim, |u: &DVector<f64>| {
                    transform
                        .apply(u)
                        .ok()
                        .and_then(|x| base.pdf(&x).ok())
                        .unwrap_or(0.0)
                });
                let (_, sup) = self.optimizer.maximize(&objective, &unit_cube)?;
                sups.push(sup.max(0.0));
            }
        }

        self.weights = masses.iter().map(|mass| mass / total).collect();
        self.normalization = 1.0 / total;
        self.sups = sups;
        self.selector = if self.config.use_rejection_sampling {
            None
        } else {
            Some(
                WeightedAliasIndex::new(self.weights.clone()).map_err(|_| {
                    DistError::InvalidParameter {
                        msg: "simplex masses do not form a valid discrete selector",
                    }
                })?,
            )
        };
        self.range = self.mesh.bounding_interval().intersect(&self.base.range())?;
        self.mean_cache = OnceLock::new();
        self.cov_cache = OnceLock::new();
        Ok(())
    }

    /// Probability of an axis-aligned interval under the truncated law.
    ///
    /// An interval missing the mesh entirely has probability zero and one
    /// covering the whole numeric range has probability one. Otherwise the
    /// density is integrated over the mesh restricted to the interval, or,
    /// when the mesh cannot represent that restriction, by tensor quadrature
    /// over the clipped box.
    pub fn probability(&self, interval: &Interval) -> Result<f64, DistError> {
        if interval.dim() != self.dim() {
            return Err(DistError::DimensionMismatch {
                expected: self.dim(),
                got: interval.dim(),
            });
        }
        let clipped = interval.intersect(&self.range)?;
        if clipped.is_empty() {
            return Ok(0.0);
        }
        if clipped.lower() == self.range.lower() && clipped.upper() == self.range.upper() {
            return Ok(1.0);
        }
        let pdf = FnIntegrand::new(self.dim(), 1, |x: &DVector<f64>| {
            DVector::from_element(1, self.pdf(x).unwrap_or(0.0))
        });
        let mass = match self.mesh.intersect(&clipped) {
            Ok(submesh) => self.cubature.integrate_over_mesh(&pdf, &submesh)?[0],
            Err(GeomError::UnsupportedIntersection { .. }) => {
                quadrature_for(self.dim(), self.config.max_integration_nodes)?
                    .integrate_over_interval(&pdf, &clipped)?[0]
            }
            Err(other) => return Err(other.into()),
        };
        Ok(mass.clamp(0.0, 1.0))
    }

    /// Componentwise shifted moment `E[(Xᵢ − shiftᵢ)^order]` by mesh
    /// cubature. Order zero is the all-ones vector.
    pub fn shifted_moment(
        &self,
        order: u32,
        shift: &DVector<f64>,
    ) -> Result<DVector<f64>, DistError> {
        check_point(shift, self.dim())?;
        if order == 0 {
            return Ok(DVector::from_element(self.dim(), 1.0));
        }
        let dim = self.dim();
        let normalization = self.normalization;
        let base = self.base.as_ref();
        let integrand = FnIntegrand::new(dim, dim, |x: &DVector<f64>| {
            let weight = normalization * base.pdf(x).unwrap_or(0.0);
            DVector::from_fn(dim, |i, _| weight * (x[i] - shift[i]).powi(order as i32))
        });
        let moment = self.cubature.integrate_over_mesh(&integrand, self.mesh.as_ref())?;
        Ok(DVector::from_vec(moment))
    }

    fn sample_global(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        let mut attempts = 0_usize;
        loop {
            attempts += 1;
            if attempts % REJECTION_WARN_INTERVAL == 0 {
                warn!(
                    "global rejection sampling rejected {} base draws outside the mesh",
                    attempts
                );
            }
            let point = self.base.sample(rng)?;
            if self.mesh.contains(&point) {
                return Ok(point);
            }
        }
    }

    fn sample_per_simplex(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        let selector = self.selector.as_ref().ok_or(DistError::InvalidParameter {
            msg: "the simplex selector is unavailable under global rejection sampling",
        })?;
        // The simplex index is drawn once; only the in-simplex candidate is
        // retried, so the accepted draws keep the per-simplex masses exact.
        let k = rng.sample(selector);
        let transform = SimplexTransform::new(self.mesh.vertices_of(k)?)?;
        let mut attempts = 0_usize;
        loop {
            attempts += 1;
            if attempts % REJECTION_WARN_INTERVAL == 0 {
                warn!(
                    "per-simplex rejection sampling rejected {} candidates in simplex {}",
                    attempts, k
                );
            }
            let u = DVector::from_fn(self.dim(), |_, _| rng.random::<f64>());
            let point = transform.apply(&u)?;
            if rng.random::<f64>() * self.sups[k] <= self.base.pdf(&point)? {
                return Ok(point);
            }
        }
    }
}

impl Distribution for MeshTruncated {
    fn dim(&self) -> usize {
        self.base.dim()
    }

    fn pdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, self.dim())?;
        if self.mesh.contains(x) {
            Ok(self.normalization * self.base.pdf(x)?)
        } else {
            Ok(0.0)
        }
    }

    fn cdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, self.dim())?;
        let upper = x.zip_map(self.range.upper(), f64::min);
        let below = Interval::new(self.range.lower().clone(), upper)?;
        if below.is_empty() {
            return Ok(0.0);
        }
        self.probability(&below)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        if self.config.use_rejection_sampling {
            self.sample_global(rng)
        } else {
            self.sample_per_simplex(rng)
        }
    }

    fn range(&self) -> Interval {
        self.range.clone()
    }

    fn parameter(&self) -> DVector<f64> {
        self.base.parameter()
    }

    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        self.base.set_parameter(parameter)?;
        self.rebind()
    }

    fn mean(&self) -> Result<DVector<f64>, DistError> {
        if let Some(mean) = self.mean_cache.get() {
            return Ok(mean.clone());
        }
        let dim = self.dim();
        let normalization = self.normalization;
        let base = self.base.as_ref();
        let integrand = FnIntegrand::new(dim, dim, |x: &DVector<f64>| {
            normalization * base.pdf(x).unwrap_or(0.0) * x
        });
        let mean = DVector::from_vec(
            self.cubature
                .integrate_over_mesh(&integrand, self.mesh.as_ref())?,
        );
        Ok(self.mean_cache.get_or_init(|| mean).clone())
    }

    fn covariance(&self) -> Result<DMatrix<f64>, DistError> {
        if let Some(cov) = self.cov_cache.get() {
            return Ok(cov.clone());
        }
        let dim = self.dim();
        let mean = self.mean()?;
        let normalization = self.normalization;
        let base = self.base.as_ref();
        let packed_len = dim * (dim + 1) / 2;
        let integrand = FnIntegrand::new(dim, packed_len, |x: &DVector<f64>| {
            let weight = normalization * base.pdf(x).unwrap_or(0.0);
            let mut packed = DVector::zeros(packed_len);
            let mut index = 0;
            for i in 0..dim {
                for j in 0..=i {
                    packed[index] = weight * (x[i] - mean[i]) * (x[j] - mean[j]);
                    index += 1;
                }
            }
            packed
        });
        let packed = self
            .cubature
            .integrate_over_mesh(&integrand, self.mesh.as_ref())?;
        let mut cov = DMatrix::zeros(dim, dim);
        let mut index = 0;
        for i in 0..dim {
            for j in 0..=i {
                cov[(i, j)] = packed[index];
                cov[(j, i)] = packed[index];
                index += 1;
            }
        }
        Ok(self.cov_cache.get_or_init(|| cov).clone())
    }

    fn marginal(&self, indices: &[usize]) -> Result<Box<dyn Distribution>, DistError> {
        check_indices(indices, self.dim())?;
        if indices.len() == self.dim() && indices.iter().enumerate().all(|(k, &i)| k == i) {
            return Ok(self.boxed_clone());
        }
        Ok(Box::new(GenericMarginal::new(self.boxed_clone(), indices)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_as(&self, other: &dyn Distribution) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|other| {
            self.base.same_as(other.base.as_ref())
                && same_mesh(self.mesh.as_ref(), other.mesh.as_ref())
                && self.config == other.config
        })
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}
