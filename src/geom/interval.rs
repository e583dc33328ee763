use crate::geom::GeomError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// An axis-aligned interval with per-coordinate finiteness flags.
///
/// The numeric bounds are always finite and usable for quadrature; the flags
/// record whether a coordinate is mathematically bounded. Distributions with
/// unbounded support report a finite *numeric* range (e.g. the univariate
/// normal reports `mean ± 8.5 σ`) with the corresponding flag cleared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    lower: DVector<f64>,
    upper: DVector<f64>,
    finite_lower: Vec<bool>,
    finite_upper: Vec<bool>,
}

impl Interval {
    /// Creates an interval with all bounds marked finite. An interval with
    /// `lower[i] > upper[i]` for some `i` is the empty interval.
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Result<Self, GeomError> {
        if lower.len() != upper.len() {
            return Err(GeomError::DimensionMismatch {
                expected: lower.len(),
                got: upper.len(),
            });
        }
        if lower.iter().chain(upper.iter()).any(|v| !v.is_finite()) {
            return Err(GeomError::InvalidInterval {
                msg: "numeric bounds must be finite",
            });
        }
        let dim = lower.len();
        Ok(Self {
            lower,
            upper,
            finite_lower: vec![true; dim],
            finite_upper: vec![true; dim],
        })
    }

    /// Creates an interval with explicit finiteness flags.
    pub fn with_finite_flags(
        lower: DVector<f64>,
        upper: DVector<f64>,
        finite_lower: Vec<bool>,
        finite_upper: Vec<bool>,
    ) -> Result<Self, GeomError> {
        let mut interval = Self::new(lower, upper)?;
        if finite_lower.len() != interval.dim() || finite_upper.len() != interval.dim() {
            return Err(GeomError::DimensionMismatch {
                expected: interval.dim(),
                got: finite_lower.len().max(finite_upper.len()),
            });
        }
        interval.finite_lower = finite_lower;
        interval.finite_upper = finite_upper;
        Ok(interval)
    }

    /// Creates a one-dimensional interval `[a, b]`.
    pub fn univariate(a: f64, b: f64) -> Self {
        Self {
            lower: DVector::from_element(1, a),
            upper: DVector::from_element(1, b),
            finite_lower: vec![true],
            finite_upper: vec![true],
        }
    }

    /// The coordinate dimension.
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Lower numeric bounds.
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// Upper numeric bounds.
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// Per-coordinate lower-bound finiteness flags.
    pub fn finite_lower(&self) -> &[bool] {
        &self.finite_lower
    }

    /// Per-coordinate upper-bound finiteness flags.
    pub fn finite_upper(&self) -> &[bool] {
        &self.finite_upper
    }

    /// Whether the interval contains no point.
    pub fn is_empty(&self) -> bool {
        self.lower.iter().zip(self.upper.iter()).any(|(l, u)| l > u)
    }

    /// Whether `point` lies inside the closed interval.
    pub fn contains(&self, point: &DVector<f64>) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(x, (l, u))| l <= x && x <= u)
    }

    /// Coordinate-wise intersection with another interval of the same
    /// dimension. A coordinate of the result is finite if it is finite in
    /// either operand.
    pub fn intersect(&self, other: &Interval) -> Result<Interval, GeomError> {
        if other.dim() != self.dim() {
            return Err(GeomError::DimensionMismatch {
                expected: self.dim(),
                got: other.dim(),
            });
        }
        let lower = self.lower.zip_map(&other.lower, f64::max);
        let upper = self.upper.zip_map(&other.upper, f64::min);
        let finite_lower = self
            .finite_lower
            .iter()
            .zip(other.finite_lower.iter())
            .map(|(a, b)| *a || *b)
            .collect();
        let finite_upper = self
            .finite_upper
            .iter()
            .zip(other.finite_upper.iter())
            .map(|(a, b)| *a || *b)
            .collect();
        Ok(Interval {
            lower,
            upper,
            finite_lower,
            finite_upper,
        })
    }

    /// Concatenates two intervals into an interval over the product space.
    pub fn concat(&self, other: &Interval) -> Interval {
        let dim = self.dim() + other.dim();
        let lower = DVector::from_iterator(
            dim,
            self.lower.iter().chain(other.lower.iter()).copied(),
        );
        let upper = DVector::from_iterator(
            dim,
            self.upper.iter().chain(other.upper.iter()).copied(),
        );
        let mut finite_lower = self.finite_lower.clone();
        finite_lower.extend_from_slice(&other.finite_lower);
        let mut finite_upper = self.finite_upper.clone();
        finite_upper.extend_from_slice(&other.finite_upper);
        Interval {
            lower,
            upper,
            finite_lower,
            finite_upper,
        }
    }

    /// The volume of the interval (zero when empty).
    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(l, u)| u - l)
            .product()
    }
}
