use crate::dist::generic::{
    numeric_cdf, numeric_covariance, numeric_mean, quadrature_for, DEFAULT_NODE_BUDGET,
};
use crate::dist::{check_indices, check_point, concat, DistError, Distribution, GenericMarginal};
use crate::geom::Interval;
use crate::numint::{FnIntegrand, Integrator};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Grid points per conditioning axis when hulling the conditioned ranges.
const RANGE_GRID_POINTS: usize = 16;

/// Maps a conditioning value to the parameter vector of the conditioned
/// family, optionally modulated by a parameter vector of its own.
///
/// The closure receives the conditioning value and the link parameter, in
/// that order. Two links compare equal only when they share the same
/// underlying closure allocation and the same dimensions and parameter.
#[derive(Clone)]
pub struct LinkFunction {
    f: Arc<dyn Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + Send + Sync>,
    input_dim: usize,
    output_dim: usize,
    parameter: DVector<f64>,
}

impl LinkFunction {
    /// Wraps a closure mapping conditioning values of dimension `input_dim`
    /// to parameter vectors of length `output_dim`, with no link parameter.
    pub fn new<F>(input_dim: usize, output_dim: usize, f: F) -> Self
    where
        F: Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            input_dim,
            output_dim,
            parameter: DVector::zeros(0),
        }
    }

    /// Attaches a link parameter passed to every closure call.
    pub fn with_parameter(mut self, parameter: DVector<f64>) -> Self {
        self.parameter = parameter;
        self
    }

    /// The identity link: the conditioning value is the parameter vector.
    pub fn identity(dim: usize) -> Self {
        Self::new(dim, dim, |y: &DVector<f64>, _: &DVector<f64>| y.clone())
    }

    /// Input (conditioning) dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Output (parameter) dimension.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// The link parameter.
    pub fn parameter(&self) -> &DVector<f64> {
        &self.parameter
    }

    /// Replaces the link parameter. The length must not change.
    pub fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        if parameter.len() != self.parameter.len() {
            return Err(DistError::ParameterMismatch {
                expected: self.parameter.len(),
                got: parameter.len(),
            });
        }
        self.parameter = parameter.clone();
        Ok(())
    }

    /// Evaluates the link at a conditioning value.
    pub fn call(&self, y: &DVector<f64>) -> Result<DVector<f64>, DistError> {
        if y.len() != self.input_dim {
            return Err(DistError::DimensionMismatch {
                expected: self.input_dim,
                got: y.len(),
            });
        }
        let out = (self.f)(y, &self.parameter);
        if out.len() != self.output_dim {
            return Err(DistError::LinkMismatch {
                msg: "the link closure returned a vector of the wrong length",
            });
        }
        Ok(out)
    }

    /// Equality capability mirroring [`Distribution::same_as`].
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
            && self.input_dim == other.input_dim
            && self.output_dim == other.output_dim
            && self.parameter == other.parameter
    }
}

impl fmt::Debug for LinkFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkFunction")
            .field("input_dim", &self.input_dim)
            .field("output_dim", &self.output_dim)
            .field("parameter", &self.parameter)
            .finish()
    }
}

/// Validates a conditioned/conditioning/link triple.
fn check_composition(
    conditioned: &dyn Distribution,
    conditioning: &dyn Distribution,
    link: &LinkFunction,
) -> Result<(), DistError> {
    if !conditioned.is_continuous() {
        return Err(DistError::NotContinuous {
            name: "the conditioned family",
        });
    }
    if !conditioning.is_continuous() {
        return Err(DistError::NotContinuous {
            name: "the conditioning distribution",
        });
    }
    if link.input_dim() != conditioning.dim() {
        return Err(DistError::LinkMismatch {
            msg: "the link input dimension must equal the conditioning dimension",
        });
    }
    if link.output_dim() != conditioned.parameter().len() {
        return Err(DistError::LinkMismatch {
            msg: "the link output length must equal the conditioned parameter length",
        });
    }
    Ok(())
}

/// Hull of the conditioned ranges over a grid of conditioning values.
///
/// A coordinate stays flagged finite only when it is finite for every grid
/// image; grid points whose link image is not an admissible parameter are
/// skipped.
fn conditioned_range_hull(
    conditioned: &dyn Distribution,
    conditioning: &dyn Distribution,
    link: &LinkFunction,
) -> Result<Interval, DistError> {
    let y_range = conditioning.range();
    let n = conditioning.dim();
    let radices = vec![RANGE_GRID_POINTS; n];
    let mut hull: Option<Interval> = None;

    for index in crate::math::GridIndices::new(&radices) {
        let y = DVector::from_fn(n, |axis, _| {
            let (l, u) = (y_range.lower()[axis], y_range.upper()[axis]);
            l + (u - l) * index[axis] as f64 / (RANGE_GRID_POINTS - 1) as f64
        });
        let Ok(parameter) = link.call(&y) else {
            continue;
        };
        let mut template = conditioned.boxed_clone();
        if template.set_parameter(&parameter).is_err() {
            continue;
        }
        let range = template.range();
        hull = Some(match hull {
            None => range,
            Some(hull) => Interval::with_finite_flags(
                hull.lower().zip_map(range.lower(), f64::min),
                hull.upper().zip_map(range.upper(), f64::max),
                (0..conditioned.dim())
                    .map(|i| hull.finite_lower()[i] && range.finite_lower()[i])
                    .collect(),
                (0..conditioned.dim())
                    .map(|i| hull.finite_upper()[i] && range.finite_upper()[i])
                    .collect(),
            )?,
        });
    }
    hull.ok_or(DistError::InvalidParameter {
        msg: "no conditioning value yields admissible conditioned parameters",
    })
}

/// The marginal distribution of the conditioned variable, with the
/// conditioning variable integrated out.
///
/// For `Y ~ conditioning` and `X | Y = y ~ family(link(y))` this is the law
/// of `X` alone: its density is the conditioning-range integral of
/// `p_Y(y) · p_X(x; link(y))`.
#[derive(Clone, Debug)]
pub struct Deconditioned {
    conditioned: Box<dyn Distribution>,
    conditioning: Box<dyn Distribution>,
    link: LinkFunction,
    range: Interval,
    budget: usize,
    mean_cache: OnceLock<DVector<f64>>,
    cov_cache: OnceLock<DMatrix<f64>>,
}

impl Deconditioned {
    /// Composes a conditioned family template, a conditioning distribution
    /// and a link. Validation is eager; the numeric range is the hull of the
    /// conditioned ranges over a grid of conditioning values.
    pub fn new(
        conditioned: Box<dyn Distribution>,
        conditioning: Box<dyn Distribution>,
        link: LinkFunction,
    ) -> Result<Self, DistError> {
        check_composition(conditioned.as_ref(), conditioning.as_ref(), &link)?;
        let range = conditioned_range_hull(conditioned.as_ref(), conditioning.as_ref(), &link)?;
        Ok(Self {
            conditioned,
            conditioning,
            link,
            range,
            budget: DEFAULT_NODE_BUDGET,
            mean_cache: OnceLock::new(),
            cov_cache: OnceLock::new(),
        })
    }

    /// The conditioned family template.
    pub fn conditioned(&self) -> &dyn Distribution {
        self.conditioned.as_ref()
    }

    /// The conditioning distribution.
    pub fn conditioning(&self) -> &dyn Distribution {
        self.conditioning.as_ref()
    }

    /// The link function.
    pub fn link(&self) -> &LinkFunction {
        &self.link
    }
}

impl Distribution for Deconditioned {
    fn dim(&self) -> usize {
        self.conditioned.dim()
    }

    fn pdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, self.dim())?;
        let y_range = self.conditioning.range();
        let integrand = FnIntegrand::new(y_range.dim(), 1, |y: &DVector<f64>| {
            let weight = self.conditioning.pdf(y).unwrap_or(0.0);
            if weight <= 0.0 {
                return DVector::zeros(1);
            }
            let density = self
                .link
                .call(y)
                .and_then(|parameter| {
                    let mut template = self.conditioned.clone();
                    template.set_parameter(&parameter)?;
                    template.pdf(x)
                })
                .unwrap_or(0.0);
            DVector::from_element(1, weight * density)
        });
        let result = quadrature_for(y_range.dim(), self.budget)?
            .integrate_over_interval(&integrand, &y_range)?;
        Ok(result[0].max(0.0))
    }

    fn cdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        numeric_cdf(self, x, self.budget)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        let y = self.conditioning.sample(rng)?;
        let mut template = self.conditioned.clone();
        template.set_parameter(&self.link.call(&y)?)?;
        template.sample(rng)
    }

    fn range(&self) -> Interval {
        self.range.clone()
    }

    fn parameter(&self) -> DVector<f64> {
        concat(self.link.parameter(), &self.conditioning.parameter())
    }

    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        let split = self.link.parameter().len();
        let expected = split + self.conditioning.parameter().len();
        if parameter.len() != expected {
            return Err(DistError::ParameterMismatch {
                expected,
                got: parameter.len(),
            });
        }
        self.link.set_parameter(&parameter.rows(0, split).into_owned())?;
        self.conditioning
            .set_parameter(&parameter.rows(split, parameter.len() - split).into_owned())?;
        self.range = conditioned_range_hull(
            self.conditioned.as_ref(),
            self.conditioning.as_ref(),
            &self.link,
        )?;
        self.mean_cache = OnceLock::new();
        self.cov_cache = OnceLock::new();
        Ok(())
    }

    fn mean(&self) -> Result<DVector<f64>, DistError> {
        if let Some(mean) = self.mean_cache.get() {
            return Ok(mean.clone());
        }
        let mean = numeric_mean(self, self.budget)?;
        Ok(self.mean_cache.get_or_init(|| mean).clone())
    }

    fn covariance(&self) -> Result<DMatrix<f64>, DistError> {
        if let Some(cov) = self.cov_cache.get() {
            return Ok(cov.clone());
        }
        let cov = numeric_covariance(self, &self.mean()?, self.budget)?;
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
            self.conditioned.same_as(other.conditioned.as_ref())
                && self.conditioning.same_as(other.conditioning.as_ref())
                && self.link.same_as(&other.link)
        })
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

/// The joint distribution of `(Y, X)` where `Y ~ conditioning` and
/// `X | Y = y ~ family(link(y))`.
///
/// The conditioning block occupies the leading coordinates. The joint
/// density is `p_Y(y) · p_X(x; link(y))` and short-circuits to zero wherever
/// the conditioning density vanishes, so the conditioned family is never
/// evaluated with parameters the link produced from an impossible `y`.
#[derive(Clone, Debug)]
pub struct ConditionalJoint {
    conditioned: Box<dyn Distribution>,
    conditioning: Box<dyn Distribution>,
    link: LinkFunction,
    weight: f64,
    range: Interval,
    budget: usize,
    mean_cache: OnceLock<DVector<f64>>,
    cov_cache: OnceLock<DMatrix<f64>>,
}

impl ConditionalJoint {
    /// Composes the joint from a conditioned family template, a conditioning
    /// distribution and a link. Both distributions must be continuous, the
    /// link input must match the conditioning dimension and the link output
    /// must match the conditioned parameter length.
    pub fn new(
        conditioned: Box<dyn Distribution>,
        conditioning: Box<dyn Distribution>,
        link: LinkFunction,
    ) -> Result<Self, DistError> {
        check_composition(conditioned.as_ref(), conditioning.as_ref(), &link)?;
        let range = conditioning.range().concat(&conditioned_range_hull(
            conditioned.as_ref(),
            conditioning.as_ref(),
            &link,
        )?);
        Ok(Self {
            conditioned,
            conditioning,
            link,
            weight: 1.0,
            range,
            budget: DEFAULT_NODE_BUDGET,
            mean_cache: OnceLock::new(),
            cov_cache: OnceLock::new(),
        })
    }

    /// Composes with the identity link: the conditioning realization is used
    /// directly as the conditioned parameter vector.
    pub fn with_identity_link(
        conditioned: Box<dyn Distribution>,
        conditioning: Box<dyn Distribution>,
    ) -> Result<Self, DistError> {
        let link = LinkFunction::identity(conditioning.dim());
        Self::new(conditioned, conditioning, link)
    }

    /// The conditioned family template.
    pub fn conditioned(&self) -> &dyn Distribution {
        self.conditioned.as_ref()
    }

    /// The conditioning distribution.
    pub fn conditioning(&self) -> &dyn Distribution {
        self.conditioning.as_ref()
    }

    /// The link function.
    pub fn link(&self) -> &LinkFunction {
        &self.link
    }

    /// The importance weight attached to the composition.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Sets the importance weight. Survives [`Distribution::set_parameter`].
    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// The marginal law of the conditioned block.
    pub fn deconditioned(&self) -> Result<Deconditioned, DistError> {
        Deconditioned::new(
            self.conditioned.clone(),
            self.conditioning.clone(),
            self.link.clone(),
        )
    }
}

impl Distribution for ConditionalJoint {
    fn dim(&self) -> usize {
        self.conditioning.dim() + self.conditioned.dim()
    }

    fn pdf(&self, z: &DVector<f64>) -> Result<f64, DistError> {
        check_point(z, self.dim())?;
        let n = self.conditioning.dim();
        let y = z.rows(0, n).into_owned();
        let weight = self.conditioning.pdf(&y)?;
        if weight <= 0.0 {
            return Ok(0.0);
        }
        let x = z.rows(n, self.dim() - n).into_owned();
        let mut template = self.conditioned.clone();
        template.set_parameter(&self.link.call(&y)?)?;
        Ok(weight * template.pdf(&x)?)
    }

    fn cdf(&self, z: &DVector<f64>) -> Result<f64, DistError> {
        numeric_cdf(self, z, self.budget)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        let y = self.conditioning.sample(rng)?;
        let mut template = self.conditioned.clone();
        template.set_parameter(&self.link.call(&y)?)?;
        let x = template.sample(rng)?;
        Ok(concat(&y, &x))
    }

    fn range(&self) -> Interval {
        self.range.clone()
    }

    fn parameter(&self) -> DVector<f64> {
        concat(self.link.parameter(), &self.conditioning.parameter())
    }

    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        let split = self.link.parameter().len();
        let expected = split + self.conditioning.parameter().len();
        if parameter.len() != expected {
            return Err(DistError::ParameterMismatch {
                expected,
                got: parameter.len(),
            });
        }
        self.link.set_parameter(&parameter.rows(0, split).into_owned())?;
        self.conditioning
            .set_parameter(&parameter.rows(split, parameter.len() - split).into_owned())?;
        self.range = self.conditioning.range().concat(&conditioned_range_hull(
            self.conditioned.as_ref(),
            self.conditioning.as_ref(),
            &self.link,
        )?);
        self.mean_cache = OnceLock::new();
        self.cov_cache = OnceLock::new();
        Ok(())
    }

    fn mean(&self) -> Result<DVector<f64>, DistError> {
        if let Some(mean) = self.mean_cache.get() {
            return Ok(mean.clone());
        }
        let mean = concat(&self.conditioning.mean()?, &self.deconditioned()?.mean()?);
        Ok(self.mean_cache.get_or_init(|| mean).clone())
    }

    /// Covariance by joint-range quadrature of the mean-centered products
    /// over the conditioned rows, with the conditioning block then replaced
    /// by the exact conditioning covariance. Centering inside the integrand
    /// keeps the quadrature accurate when coordinates are large relative to
    /// their spread.
    fn covariance(&self) -> Result<DMatrix<f64>, DistError> {
        if let Some(cov) = self.cov_cache.get() {
            return Ok(cov.clone());
        }
        let n = self.conditioning.dim();
        let d = self.dim();
        let mean = self.mean()?;
        let second_len: usize = (n..d).map(|i| i + 1).sum();

        let integrand = FnIntegrand::new(d, second_len, |z: &DVector<f64>| {
            let weight = self.pdf(z).unwrap_or(0.0);
            let mut packed = DVector::zeros(second_len);
            let mut index = 0;
            for i in n..d {
                for j in 0..=i {
                    packed[index] = weight * (z[i] - mean[i]) * (z[j] - mean[j]);
                    index += 1;
                }
            }
            packed
        });
        let packed =
            quadrature_for(d, self.budget)?.integrate_over_interval(&integrand, &self.range)?;

        let mut cov = DMatrix::zeros(d, d);
        let mut index = 0;
        for i in n..d {
            for j in 0..=i {
                cov[(i, j)] = packed[index];
                cov[(j, i)] = packed[index];
                index += 1;
            }
        }
        cov.view_mut((0, 0), (n, n))
            .copy_from(&self.conditioning.covariance()?);
        Ok(self.cov_cache.get_or_init(|| cov).clone())
    }

    /// Marginals split by block: a subset of the conditioning block is a
    /// conditioning marginal, the whole conditioned block is the
    /// deconditioned law, anything straddling the blocks falls back to
    /// numeric marginalization.
    fn marginal(&self, indices: &[usize]) -> Result<Box<dyn Distribution>, DistError> {
        check_indices(indices, self.dim())?;
        let n = self.conditioning.dim();
        if indices.iter().all(|&i| i < n) {
            return self.conditioning.marginal(indices);
        }
        if indices.iter().all(|&i| i >= n) {
            let shifted: Vec<usize> = indices.iter().map(|&i| i - n).collect();
            return self.deconditioned()?.marginal(&shifted);
        }
        Ok(Box::new(GenericMarginal::new(self.boxed_clone(), indices)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_as(&self, other: &dyn Distribution) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|other| {
            self.conditioned.same_as(other.conditioned.as_ref())
                && self.conditioning.same_as(other.conditioning.as_ref())
                && self.link.same_as(&other.link)
                && self.weight == other.weight
        })
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::{Normal, Uniform};
    use crate::numint::GaussLegendre;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// Y ~ U(0, 1), X | Y = y ~ N(y, 1).
    fn normal_mean_joint() -> ConditionalJoint {
        let link = LinkFunction::new(1, 2, |y: &DVector<f64>, _: &DVector<f64>| {
            dvector![y[0], 1.0]
        });
        ConditionalJoint::new(
            Box::new(Normal::new(0.0, 1.0).unwrap()),
            Box::new(Uniform::univariate(0.0, 1.0).unwrap()),
            link,
        )
        .unwrap()
    }

    #[test]
    fn test_link_validation() {
        let link = LinkFunction::identity(2);
        assert!(link.call(&dvector![1.0]).is_err());
        assert_eq!(link.call(&dvector![1.0, 2.0]).unwrap(), dvector![1.0, 2.0]);

        let bad_output = LinkFunction::new(1, 3, |y: &DVector<f64>, _: &DVector<f64>| y.clone());
        assert!(matches!(
            bad_output.call(&dvector![1.0]),
            Err(DistError::LinkMismatch { .. })
        ));

        // Wrong link output length for the family parameter.
        assert!(ConditionalJoint::new(
            Box::new(Normal::new(0.0, 1.0).unwrap()),
            Box::new(Uniform::univariate(0.0, 1.0).unwrap()),
            LinkFunction::identity(1),
        )
        .is_err());
    }

    #[test]
    fn test_link_parameter() {
        let link = LinkFunction::new(1, 2, |y: &DVector<f64>, theta: &DVector<f64>| {
            dvector![y[0] + theta[0], theta[1]]
        })
        .with_parameter(dvector![3.0, 2.0]);
        assert_eq!(link.call(&dvector![1.0]).unwrap(), dvector![4.0, 2.0]);
        let mut link = link;
        assert!(link.set_parameter(&dvector![1.0]).is_err());
        link.set_parameter(&dvector![0.0, 5.0]).unwrap();
        assert_eq!(link.call(&dvector![1.0]).unwrap(), dvector![1.0, 5.0]);
    }

    #[test]
    fn test_identity_link_composition() {
        // (mean, std dev) of the conditioned normal drawn uniformly.
        let joint = ConditionalJoint::with_identity_link(
            Box::new(Normal::new(0.0, 1.0).unwrap()),
            Box::new(
                Uniform::new(Interval::new(dvector![0.0, 1.0], dvector![1.0, 2.0]).unwrap())
                    .unwrap(),
            ),
        )
        .unwrap();
        assert_eq!(joint.dim(), 3);
        assert_abs_diff_eq!(
            joint.pdf(&dvector![0.5, 1.5, 0.5]).unwrap(),
            1.0 / (1.5 * (2.0 * std::f64::consts::PI).sqrt()),
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_joint_pdf_and_short_circuit() {
        let joint = normal_mean_joint();
        assert_eq!(joint.dim(), 2);
        // Inside: p_Y = 1, X | 0.5 ~ N(0.5, 1) evaluated at its mean.
        assert_abs_diff_eq!(
            joint.pdf(&dvector![0.5, 0.5]).unwrap(),
            1.0 / (2.0 * std::f64::consts::PI).sqrt(),
            epsilon = 1e-14
        );
        // Outside the conditioning support the density is exactly zero.
        assert_eq!(joint.pdf(&dvector![-0.5, 0.5]).unwrap(), 0.0);
        assert!(joint.pdf(&dvector![0.5]).is_err());
    }

    #[test]
    fn test_joint_density_normalized() {
        let joint = normal_mean_joint();
        let pdf = FnIntegrand::new(2, 1, |z: &DVector<f64>| {
            DVector::from_element(1, joint.pdf(z).unwrap())
        });
        let mass = GaussLegendre::uniform(2, 96)
            .unwrap()
            .integrate_over_interval(&pdf, &joint.range())
            .unwrap();
        assert_abs_diff_eq!(mass[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_joint_range_blocks() {
        let joint = normal_mean_joint();
        let range = joint.range();
        assert_abs_diff_eq!(range.lower()[0], 0.0);
        assert_abs_diff_eq!(range.upper()[0], 1.0);
        // Conditioned hull: N(0, 1) to N(1, 1) numeric ranges.
        assert_abs_diff_eq!(range.lower()[1], -8.5);
        assert_abs_diff_eq!(range.upper()[1], 9.5);
        assert_eq!(range.finite_lower(), &[true, false]);
    }

    #[test]
    fn test_joint_moments() {
        let joint = normal_mean_joint();
        let mean = joint.mean().unwrap();
        assert_abs_diff_eq!(mean[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(mean[1], 0.5, epsilon = 1e-3);

        let cov = joint.covariance().unwrap();
        // Conditioning block is exact.
        assert_abs_diff_eq!(cov[(0, 0)], 1.0 / 12.0);
        // Var X = E Var(X | Y) + Var E(X | Y) = 1 + 1/12.
        assert_abs_diff_eq!(cov[(1, 1)], 1.0 + 1.0 / 12.0, epsilon = 1e-3);
        // Cov(Y, X) = Var Y.
        assert_abs_diff_eq!(cov[(0, 1)], 1.0 / 12.0, epsilon = 1e-3);
        assert_abs_diff_eq!(cov[(0, 1)], cov[(1, 0)]);
    }

    #[test]
    fn test_covariance_far_from_origin() {
        // Same structure as the moment test, but shifted by 1e6 so that raw
        // second moments would drown the covariance in cancellation error.
        let link = LinkFunction::new(1, 2, |y: &DVector<f64>, _: &DVector<f64>| {
            dvector![y[0], 1.0]
        });
        let joint = ConditionalJoint::new(
            Box::new(Normal::new(0.0, 1.0).unwrap()),
            Box::new(Uniform::univariate(1.0e6, 1.0e6 + 1.0).unwrap()),
            link,
        )
        .unwrap();
        let cov = joint.covariance().unwrap();
        assert_abs_diff_eq!(cov[(0, 0)], 1.0 / 12.0);
        assert_abs_diff_eq!(cov[(1, 1)], 1.0 + 1.0 / 12.0, epsilon = 1e-3);
        assert_abs_diff_eq!(cov[(0, 1)], 1.0 / 12.0, epsilon = 1e-3);
    }

    #[test]
    fn test_deconditioned_density() {
        let joint = normal_mean_joint();
        let deconditioned = joint.deconditioned().unwrap();
        // ∫₀¹ φ(x − y) dy = Φ(x) − Φ(x − 1) at x = 0.5.
        assert_abs_diff_eq!(
            deconditioned.pdf(&dvector![0.5]).unwrap(),
            0.3829249225,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(deconditioned.mean().unwrap()[0], 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(
            deconditioned.covariance().unwrap()[(0, 0)],
            1.0 + 1.0 / 12.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_marginal_blocks() {
        let joint = normal_mean_joint();
        let conditioning = joint.marginal(&[0]).unwrap();
        assert!(conditioning.same_as(&Uniform::univariate(0.0, 1.0).unwrap()));
        let conditioned = joint.marginal(&[1]).unwrap();
        assert!(conditioned.same_as(&joint.deconditioned().unwrap()));
        // Mixed subsets fall back to the generic marginal.
        let mixed = joint.marginal(&[1, 0]).unwrap();
        assert_eq!(mixed.dim(), 2);
        assert!(mixed.as_any().downcast_ref::<GenericMarginal>().is_some());
    }

    #[test]
    fn test_ancestral_sampling() {
        let joint = normal_mean_joint();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(29);
        let draws = joint.sample_many(20_000, &mut rng).unwrap();
        for draw in &draws {
            assert!((0.0..=1.0).contains(&draw[0]));
        }
        let x_mean = draws.iter().map(|d| d[1]).sum::<f64>() / draws.len() as f64;
        assert_abs_diff_eq!(x_mean, 0.5, epsilon = 0.05);
    }

    #[test]
    fn test_parameter_roundtrip_preserves_weight() {
        let link = LinkFunction::new(1, 2, |y: &DVector<f64>, theta: &DVector<f64>| {
            dvector![y[0], theta[0]]
        })
        .with_parameter(dvector![1.0]);
        let mut joint = ConditionalJoint::new(
            Box::new(Normal::new(0.0, 1.0).unwrap()),
            Box::new(Uniform::univariate(0.0, 1.0).unwrap()),
            link,
        )
        .unwrap();
        joint.set_weight(0.25);

        // Link scale and conditioning bounds in one vector.
        assert_eq!(joint.parameter(), dvector![1.0, 0.0, 1.0]);
        joint.set_parameter(&dvector![2.0, 1.0, 3.0]).unwrap();
        assert_eq!(joint.parameter(), dvector![2.0, 1.0, 3.0]);
        assert_abs_diff_eq!(joint.weight(), 0.25);
        assert_abs_diff_eq!(
            joint.pdf(&dvector![2.0, 2.0]).unwrap(),
            0.5 / (2.0 * (2.0 * std::f64::consts::PI).sqrt()),
            epsilon = 1e-14
        );
        assert!(joint.set_parameter(&dvector![1.0]).is_err());
    }

    #[test]
    fn test_equality() {
        let joint = normal_mean_joint();
        assert!(joint.same_as(&joint.clone()));
        // A separately built link is a different closure allocation.
        assert!(!joint.same_as(&normal_mean_joint()));
        assert!(!joint.same_as(&Uniform::univariate(0.0, 1.0).unwrap()));
    }
}
