use crate::dist::{check_indices, check_point, DistError, Distribution};
use crate::geom::Interval;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// The uniform distribution over an axis-aligned box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Uniform {
    interval: Interval,
}

impl Uniform {
    /// Creates a uniform distribution over a non-empty finite box.
    pub fn new(interval: Interval) -> Result<Self, DistError> {
        if interval.is_empty() || interval.volume() == 0.0 {
            return Err(DistError::InvalidParameter {
                msg: "the support box must have positive volume",
            });
        }
        Ok(Self { interval })
    }

    /// Creates a univariate uniform distribution on `[a, b]`.
    pub fn univariate(a: f64, b: f64) -> Result<Self, DistError> {
        Self::new(Interval::univariate(a, b))
    }

    /// The support box.
    pub fn interval(&self) -> &Interval {
        &self.interval
    }
}

impl Distribution for Uniform {
    fn dim(&self) -> usize {
        self.interval.dim()
    }

    fn pdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, self.dim())?;
        if self.interval.contains(x) {
            Ok(1.0 / self.interval.volume())
        } else {
            Ok(0.0)
        }
    }

    fn cdf(&self, x: &DVector<f64>) -> Result<f64, DistError> {
        check_point(x, self.dim())?;
        let mut cdf = 1.0;
        for axis in 0..self.dim() {
            let (l, u) = (self.interval.lower()[axis], self.interval.upper()[axis]);
            cdf *= ((x[axis] - l) / (u - l)).clamp(0.0, 1.0);
        }
        Ok(cdf)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<DVector<f64>, DistError> {
        Ok(DVector::from_fn(self.dim(), |axis, _| {
            rng.random_range(self.interval.lower()[axis]..=self.interval.upper()[axis])
        }))
    }

    fn range(&self) -> Interval {
        self.interval.clone()
    }

    fn parameter(&self) -> DVector<f64> {
        DVector::from_iterator(
            2 * self.dim(),
            (0..self.dim())
                .flat_map(|axis| [self.interval.lower()[axis], self.interval.upper()[axis]]),
        )
    }

    fn set_parameter(&mut self, parameter: &DVector<f64>) -> Result<(), DistError> {
        if parameter.len() != 2 * self.dim() {
            return Err(DistError::ParameterMismatch {
                expected: 2 * self.dim(),
                got: parameter.len(),
            });
        }
        let lower = DVector::from_fn(self.dim(), |axis, _| parameter[2 * axis]);
        let upper = DVector::from_fn(self.dim(), |axis, _| parameter[2 * axis + 1]);
        *self = Self::new(Interval::new(lower, upper)?)?;
        Ok(())
    }

    fn mean(&self) -> Result<DVector<f64>, DistError> {
        Ok(0.5 * (self.interval.lower() + self.interval.upper()))
    }

    fn covariance(&self) -> Result<DMatrix<f64>, DistError> {
        let mut cov = DMatrix::zeros(self.dim(), self.dim());
        for axis in 0..self.dim() {
            let width = self.interval.upper()[axis] - self.interval.lower()[axis];
            cov[(axis, axis)] = width * width / 12.0;
        }
        Ok(cov)
    }

    fn marginal(&self, indices: &[usize]) -> Result<Box<dyn Distribution>, DistError> {
        check_indices(indices, self.dim())?;
        let lower = DVector::from_iterator(
            indices.len(),
            indices.iter().map(|&i| self.interval.lower()[i]),
        );
        let upper = DVector::from_iterator(
            indices.len(),
            indices.iter().map(|&i| self.interval.upper()[i]),
        );
        Ok(Box::new(Self::new(Interval::new(lower, upper)?)?))
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
    use nalgebra::dvector;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_pdf_cdf() {
        let uniform = Uniform::new(
            Interval::new(dvector![0.0, 0.0], dvector![2.0, 1.0]).unwrap(),
        )
        .unwrap();
        assert_abs_diff_eq!(uniform.pdf(&dvector![1.0, 0.5]).unwrap(), 0.5);
        assert_eq!(uniform.pdf(&dvector![3.0, 0.5]).unwrap(), 0.0);
        assert_abs_diff_eq!(uniform.cdf(&dvector![1.0, 0.5]).unwrap(), 0.25);
        assert_abs_diff_eq!(uniform.cdf(&dvector![5.0, 5.0]).unwrap(), 1.0);
        assert!(uniform.pdf(&dvector![1.0]).is_err());
    }

    #[test]
    fn test_moments() {
        let uniform = Uniform::univariate(0.0, 1.0).unwrap();
        assert_abs_diff_eq!(uniform.mean().unwrap()[0], 0.5);
        assert_abs_diff_eq!(uniform.covariance().unwrap()[(0, 0)], 1.0 / 12.0);
    }

    #[test]
    fn test_sampling_stays_in_box() {
        let uniform = Uniform::univariate(-2.0, 3.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        for draw in uniform.sample_many(1_000, &mut rng).unwrap() {
            assert!((-2.0..=3.0).contains(&draw[0]));
        }
    }

    #[test]
    fn test_marginal_and_equality() {
        let uniform = Uniform::new(
            Interval::new(dvector![0.0, 10.0], dvector![1.0, 20.0]).unwrap(),
        )
        .unwrap();
        let marginal = uniform.marginal(&[1]).unwrap();
        assert!(marginal.same_as(&Uniform::univariate(10.0, 20.0).unwrap()));
        assert!(!marginal.same_as(&uniform));
    }

    #[test]
    fn test_set_parameter() {
        let mut uniform = Uniform::univariate(0.0, 1.0).unwrap();
        uniform
            .set_parameter(&dvector![2.0, 6.0])
            .unwrap();
        assert_abs_diff_eq!(uniform.mean().unwrap()[0], 4.0);
        assert!(uniform.set_parameter(&dvector![1.0]).is_err());
        assert!(uniform.set_parameter(&dvector![1.0, 1.0]).is_err());
    }
}
