//! # hs-sweep
//!
//! Pure, stateless helpers that turn user-supplied ranges into concrete HPL
//! run configurations.
//!
//! Provides process-grid advice for a total rank count, the bounded cartesian
//! sweep-space generator, and advisory sanity checks for individual
//! configurations.

mod grid;
mod space;
mod tuning;

pub use grid::{advise_process_grid, GridCandidate};
pub use space::{
    generate_sweep, GenerationRequest, GenerationResponse, SweepSpace, DEFAULT_COMBINATION_CAP,
};
pub use tuning::{check_configuration, recommended_block_sizes, ConfigurationIssue};
