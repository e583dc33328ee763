#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod dist;
pub mod geom;
pub mod math;
pub mod numint;
pub mod optim;

use thiserror::Error;

/// Aggregated error type covering all modules of the crate.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MeshDistError {
    #[error(transparent)]
    Dist(#[from] dist::DistError),

    #[error(transparent)]
    Geom(#[from] geom::GeomError),

    #[error(transparent)]
    NumInt(#[from] numint::NumIntError),

    #[error(transparent)]
    Optim(#[from] optim::OptimError),
}
