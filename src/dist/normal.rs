use crate::dist::{check_indices, check_point, DistError, Distribution};
use crate::geom::Interval;
use crate::math::erf;
use nalgebra::{dvector, DMatrix, DVector};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::f64::consts::PI;

/// Width of the numeric range in standard deviations. The mass outside
/// `mean ± 8.5 σ` is below 1e-17 and invisible to the quadratures.
const RANGE_SIGMAS: f64 = 8.5;

/// The univariate normal distribution.
///
/// The mathematical support is the whole real line; the reported numeric
/// range is `mean ± 8.5 σ` with both finiteness flags cleared, so that
/// integration over the range loses no representable mass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    mean: f64,
    std_dev: f64,
}

impl Normal {
    /// Creates a normal distribution with the given mean and positive
    /// standard deviation.
    pub fn new(mean: f64, std_dev: f64) -> Result<Self, DistError> {
        if !(std_dev > 0.0) || !mean.is_finite() || !std_dev.is_finite() {
            return Err(DistError::InvalidParameter {
                msg: "the standard deviation must be positive and finite",
            });
        }
        Ok(Self { mean, std_dev })
    }

    /// The standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

impl Distribution for Normal {
    fn dim(&self) -> usize {
        1
    }

    fn pdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, 1)?;
        let z = (x[0] - self.mean) / self.std_dev;
        Ok((-0.5 * z * z).exp() / (self.std_dev * (2.0 * PI).sqrt()))
    }

    fn cdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, 1)?;
        let z = (x[0] - self.mean) / (self.std_dev * 2.0_f64.sqrt());
        Ok(0.5 * (1.0 + erf(z)))
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        let normal = rand_distr::Normal::new(self.mean, self.std_dev).map_err(|_| {
            DistError::InvalidParameter {
                msg: "the standard deviation must be positive and finite",
            }
        })?;
        Ok(dvector![rng.sample(normal)])
    }

    fn range(&self) -> Interval {
        let half_width = RANGE_SIGMAS * self.std_dev;
        Interval::with_finite_flags(
            dvector![self.mean - half_width],
            dvector![self.mean + half_width],
            vec![false],
            vec![false],
        )
        .expect("constant-width bounds are finite")
    }

    fn parameter(&self) -> DVector<f64> {
        dvector![self.mean, self.std_dev]
    }

    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        if parameter.len() != 2 {
            return Err(DistError::ParameterMismatch {
                expected: 2,
                got: parameter.len(),
            });
        }
        *self = Self::new(parameter[0], parameter[1])?;
        Ok(())
    }

    fn mean(&self) -> Result<DVector<f64>, DistError> {
        Ok(dvector![self.mean])
    }

    fn covariance(&self) -> Result<DMatrix<f64>, DistError> {
        Ok(DMatrix::from_element(1, 1, self.std_dev * self.std_dev))
    }

    fn marginal(&self, indices: &[usize]) -> Result<Box<dyn Distribution>, DistError> {
        check_indices(indices, 1)?;
        Ok(self.boxed_clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_as(&self, other: &dyn Distribution) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_pdf_cdf() {
        let normal = Normal::new(1.0, 2.0).unwrap();
        assert_abs_diff_eq!(
            normal.pdf(&dvector![1.0]).unwrap(),
            1.0 / (2.0 * (2.0 * PI).sqrt()),
            epsilon = 1e-14
        );
        assert_abs_diff_eq!(normal.cdf(&dvector![1.0]).unwrap(), 0.5, epsilon = 1e-9);
        // Φ(1) for the standard normal.
        let standard = Normal::new(0.0, 1.0).unwrap();
        assert_abs_diff_eq!(
            standard.cdf(&dvector![1.0]).unwrap(),
            0.8413447461,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_numeric_range() {
        let normal = Normal::new(3.0, 0.5).unwrap();
        let range = normal.range();
        assert_abs_diff_eq!(range.lower()[0], 3.0 - 4.25);
        assert_abs_diff_eq!(range.upper()[0], 3.0 + 4.25);
        assert_eq!(range.finite_lower(), &[false]);
    }

    #[test]
    fn test_sample_moments() {
        let normal = Normal::new(-2.0, 1.5).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(17);
        let draws = normal.sample_many(20_000, &mut rng).unwrap();
        let mean = draws.iter().map(|d| d[0]).sum::<f64>() / draws.len() as f64;
        assert_abs_diff_eq!(mean, -2.0, epsilon = 0.05);
    }

    #[test]
    fn test_invalid_std_dev() {
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        let mut normal = Normal::new(0.0, 1.0).unwrap();
        assert!(normal.set_parameter(&dvector![0.0, -2.0]).is_err());
    }
}
