//! Shared numerical helpers.
//!
//! Small self-contained routines used across the crate: unit-interval clamping
//! for the simplex change of variables, the error function backing the normal
//! CDF, and the node budgeting rule that turns a total integration-node budget
//! into a per-axis node count.

mod special;

pub use special::erf;

/// Clamps a value to the unit interval `[0, 1]`.
pub fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Largest per-axis node count whose `dim`-fold tensor product stays within
/// `budget` total nodes. Never less than one node per axis.
pub fn nodes_per_axis(budget: usize, dim: usize) -> usize {
    if dim == 0 {
        return 1;
    }
    let mut n = (budget as f64).powf(1.0 / dim as f64).round() as usize;
    while n > 1 && n.checked_pow(dim as u32).map_or(true, |total| total > budget) {
        n -= 1;
    }
    n.max(1)
}

/// Iterator over the multi-indices of a dense tensor grid with per-axis
/// radices, in odometer order.
#[derive(Clone, Debug)]
pub(crate) struct GridIndices {
    radices: Vec<usize>,
    current: Vec<usize>,
    exhausted: bool,
}

impl GridIndices {
    pub(crate) fn new(radices: &[usize]) -> Self {
        Self {
            radices: radices.to_vec(),
            current: vec![0; radices.len()],
            exhausted: radices.iter().any(|&r| r == 0),
        }
    }
}

impl Iterator for GridIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.exhausted {
            return None;
        }
        let item = self.current.clone();
        self.exhausted = true;
        for (digit, radix) in self.current.iter_mut().zip(self.radices.iter()) {
            *digit += 1;
            if *digit < *radix {
                self.exhausted = false;
                break;
            }
            *digit = 0;
        }
        Some(item)
    }
}
