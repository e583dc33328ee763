use crate::dist::{check_indices, check_point, DistError, Distribution};
use crate::geom::Interval;
use crate::math::nodes_per_axis;
use crate::numint::{FnIntegrand, GaussLegendre, Integrator};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use std::any::Any;

/// Default total integration-node budget of the generic numeric fallbacks.
pub(crate) const DEFAULT_NODE_BUDGET: usize = 16_384;

/// Hard per-axis node cap keeping one-dimensional fallbacks tractable.
const MAX_AXIS_NODES: usize = 128;

/// Tensorized quadrature sized for `dim` axes from a total node budget.
pub(crate) fn quadrature_for(dim: usize, budget: usize) -> Result<GaussLegendre, DistError> {
    let per_axis = nodes_per_axis(budget, dim).min(MAX_AXIS_NODES);
    Ok(GaussLegendre::uniform(dim, per_axis)?)
}

/// Generic CDF: integrates the density over the part of the range below `x`.
pub(crate) fn numeric_cdf(
    dist: &dyn Distribution,
    x: &DVector<f64>,
    budget: usize,
) -> Result<f64, DistError> {
    check_point(x, dist.dim())?;
    let range = dist.range();
    let upper = x.zip_map(range.upper(), f64::min);
    let below = Interval::new(range.lower().clone(), upper)?;
    if below.is_empty() {
        return Ok(0.0);
    }
    let pdf = FnIntegrand::new(dist.dim(), 1, |point: &DVector<f64>| {
        DVector::from_element(1, dist.pdf(point).unwrap_or(0.0))
    });
    let result = quadrature_for(dist.dim(), budget)?.integrate_over_interval(&pdf, &below)?;
    Ok(result[0].clamp(0.0, 1.0))
}

/// Generic mean: integrates `x · pdf(x)` over the numeric range.
pub(crate) fn numeric_mean(
    dist: &dyn Distribution,
    budget: usize,
) -> Result<DVector<f64>, DistError> {
    let dim = dist.dim();
    let integrand = FnIntegrand::new(dim, dim, |point: &DVector<f64>| {
        dist.pdf(point).unwrap_or(0.0) * point
    });
    let result =
        quadrature_for(dim, budget)?.integrate_over_interval(&integrand, &dist.range())?;
    Ok(DVector::from_vec(result))
}

/// Generic covariance: integrates the packed lower triangle of
/// `pdf(x) · (xᵢ − μᵢ)(xⱼ − μⱼ)` over the numeric range.
pub(crate) fn numeric_covariance(
    dist: &dyn Distribution,
    mean: &DVector<f64>,
    budget: usize,
) -> Result<DMatrix<f64>, DistError> {
    let dim = dist.dim();
    let packed_len = dim * (dim + 1) / 2;
    let integrand = FnIntegrand::new(dim, packed_len, |point: &DVector<f64>| {
        let pdf = dist.pdf(point).unwrap_or(0.0);
        let mut packed = DVector::zeros(packed_len);
        let mut index = 0;
        for i in 0..dim {
            let delta_i = point[i] - mean[i];
            for j in 0..=i {
                packed[index] = pdf * delta_i * (point[j] - mean[j]);
                index += 1;
            }
        }
        packed
    });
    let packed =
        quadrature_for(dim, budget)?.integrate_over_interval(&integrand, &dist.range())?;
    let mut cov = DMatrix::zeros(dim, dim);
    let mut index = 0;
    for i in 0..dim {
        for j in 0..=i {
            cov[(i, j)] = packed[index];
            cov[(j, i)] = packed[index];
            index += 1;
        }
    }
    Ok(cov)
}

/// Marginal of an arbitrary joint distribution on an index subset, with the
/// density obtained by numerically integrating the joint density over the
/// complementary coordinates.
///
/// This is the non-closed-form fallback used when no structural shortcut
/// applies (e.g. a marginal of a conditional composition spanning both
/// blocks).
#[derive(Clone, Debug)]
pub struct GenericMarginal {
    joint: Box<dyn Distribution>,
    indices: Vec<usize>,
    complement: Vec<usize>,
    budget: usize,
}

impl GenericMarginal {
    /// Creates the marginal of `joint` on `indices`.
    pub fn new(joint: Box<dyn Distribution>, indices: &[usize]) -> Result<Self, DistError> {
        check_indices(indices, joint.dim())?;
        let complement = (0..joint.dim())
            .filter(|i| !indices.contains(i))
            .collect();
        Ok(Self {
            joint,
            indices: indices.to_vec(),
            complement,
            budget: DEFAULT_NODE_BUDGET,
        })
    }

    /// The marginalized joint distribution.
    pub fn joint(&self) -> &dyn Distribution {
        self.joint.as_ref()
    }

    /// The retained indices into the joint distribution.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Assembles a full-dimension point from marginal and complement blocks.
    fn assemble(&self, kept: &DVector<f64>, dropped: &DVector<f64>) -> DVector<f64> {
        let mut full = DVector::zeros(self.joint.dim());
        for (k, &i) in self.indices.iter().enumerate() {
            full[i] = kept[k];
        }
        for (k, &i) in self.complement.iter().enumerate() {
            full[i] = dropped[k];
        }
        full
    }
}

impl Distribution for GenericMarginal {
    fn dim(&self) -> usize {
        self.indices.len()
    }

    fn is_continuous(&self) -> bool {
        self.joint.is_continuous()
    }

    fn pdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, self.dim())?;
        if self.complement.is_empty() {
            return self.joint.pdf(&self.assemble(x, &DVector::zeros(0)));
        }
        let joint_range = self.joint.range();
        let dropped_range = Interval::new(
            DVector::from_iterator(
                self.complement.len(),
                self.complement.iter().map(|&i| joint_range.lower()[i]),
            ),
            DVector::from_iterator(
                self.complement.len(),
                self.complement.iter().map(|&i| joint_range.upper()[i]),
            ),
        )?;
        let integrand = FnIntegrand::new(self.complement.len(), 1, |dropped: &DVector<f64>| {
            DVector::from_element(
                1,
                self.joint.pdf(&self.assemble(x, dropped)).unwrap_or(0.0),
            )
        });
        let result = quadrature_for(self.complement.len(), self.budget)?
            .integrate_over_interval(&integrand, &dropped_range)?;
        Ok(result[0].max(0.0))
    }

    fn cdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        numeric_cdf(self, x, self.budget)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        let joint = self.joint.sample(rng)?;
        Ok(DVector::from_iterator(
            self.dim(),
            self.indices.iter().map(|&i| joint[i]),
        ))
    }

    fn range(&self) -> Interval {
        let joint_range = self.joint.range();
        Interval::with_finite_flags(
            DVector::from_iterator(
                self.dim(),
                self.indices.iter().map(|&i| joint_range.lower()[i]),
            ),
            DVector::from_iterator(
                self.dim(),
                self.indices.iter().map(|&i| joint_range.upper()[i]),
            ),
            self.indices
                .iter()
                .map(|&i| joint_range.finite_lower()[i])
                .collect(),
            self.indices
                .iter()
                .map(|&i| joint_range.finite_upper()[i])
                .collect(),
        )
        .expect("projection of a valid interval is valid")
    }

    fn parameter(&self) -> DVector<f64> {
        self.joint.parameter()
    }

    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        self.joint.set_parameter(parameter)
    }

    fn mean(&self) -> Result<DVector<f64>, DistError> {
        let joint_mean = self.joint.mean()?;
        Ok(DVector::from_iterator(
            self.dim(),
            self.indices.iter().map(|&i| joint_mean[i]),
        ))
    }

    fn covariance(&self) -> Result<DMatrix<f64>, DistError> {
        let joint_cov = self.joint.covariance()?;
        Ok(DMatrix::from_fn(self.dim(), self.dim(), |r, c| {
            joint_cov[(self.indices[r], self.indices[c])]
        }))
    }

    fn marginal(&self, indices: &[usize]) -> Result<Box<dyn Distribution>, DistError> {
        check_indices(indices, self.dim())?;
        let composed: Vec<usize> = indices.iter().map(|&i| self.indices[i]).collect();
        Ok(Box::new(Self::new(self.joint.clone(), &composed)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_as(&self, other: &dyn Distribution) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| {
                self.indices == other.indices && self.joint.same_as(other.joint.as_ref())
            })
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::Uniform;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn joint_box() -> Box<dyn Distribution> {
        Box::new(
            Uniform::new(Interval::new(dvector![0.0, 10.0], dvector![2.0, 14.0]).unwrap())
                .unwrap(),
        )
    }

    #[test]
    fn test_marginal_density_integrates_out() {
        let marginal = GenericMarginal::new(joint_box(), &[1]).unwrap();
        // The second coordinate is uniform on [10, 14].
        assert_abs_diff_eq!(
            marginal.pdf(&dvector![12.0]).unwrap(),
            0.25,
            epsilon = 1e-10
        );
        assert_eq!(marginal.pdf(&dvector![9.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_moments_project() {
        let marginal = GenericMarginal::new(joint_box(), &[1]).unwrap();
        assert_abs_diff_eq!(marginal.mean().unwrap()[0], 12.0);
        assert_abs_diff_eq!(marginal.covariance().unwrap()[(0, 0)], 16.0 / 12.0);
    }

    #[test]
    fn test_sampling_projects() {
        let marginal = GenericMarginal::new(joint_box(), &[0]).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        for draw in marginal.sample_many(200, &mut rng).unwrap() {
            assert!((0.0..=2.0).contains(&draw[0]));
        }
    }

    #[test]
    fn test_numeric_fallbacks_match_closed_form() {
        let uniform = Uniform::univariate(0.0, 2.0).unwrap();
        let mean = numeric_mean(&uniform, DEFAULT_NODE_BUDGET).unwrap();
        assert_abs_diff_eq!(mean[0], 1.0, epsilon = 1e-10);
        let cov = numeric_covariance(&uniform, &mean, DEFAULT_NODE_BUDGET).unwrap();
        assert_abs_diff_eq!(cov[(0, 0)], 4.0 / 12.0, epsilon = 1e-10);
        assert_abs_diff_eq!(
            numeric_cdf(&uniform, &dvector![0.5], DEFAULT_NODE_BUDGET).unwrap(),
            0.25,
            epsilon = 1e-10
        );
    }
}
