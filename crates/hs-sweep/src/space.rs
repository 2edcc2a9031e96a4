//! Sweep space definition and the bounded cartesian generator.

use hs_types::{
    ConfigId, DiscreteSet, HsResult, InputError, ParameterRange, ProblemShape, SweepConfiguration,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Combination cap used when the caller does not override it.
pub const DEFAULT_COMBINATION_CAP: usize = 100;

/// The four sweep axes: problem size N, block size NB, and the P x Q grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSpace {
    pub sizes: ParameterRange,
    pub block_sizes: DiscreteSet<u32>,
    pub grid_rows: DiscreteSet<u32>,
    pub grid_cols: DiscreteSet<u32>,
}

impl SweepSpace {
    pub fn new(
        sizes: ParameterRange,
        block_sizes: DiscreteSet<u32>,
        grid_rows: DiscreteSet<u32>,
        grid_cols: DiscreteSet<u32>,
    ) -> Self {
        Self {
            sizes,
            block_sizes,
            grid_rows,
            grid_cols,
        }
    }

    /// Size of the full cartesian product, failing if it overflows `u64`.
    pub fn total_combinations(&self) -> Result<u64, InputError> {
        self.sizes.validate()?;
        let sizes = self.sizes.count().ok_or_else(|| InputError::SpaceTooLarge {
            message: format!(
                "range {}..={} step {} has more than u64::MAX sizes",
                self.sizes.start, self.sizes.end, self.sizes.step
            ),
        })?;

        [
            self.block_sizes.len(),
            self.grid_rows.len(),
            self.grid_cols.len(),
        ]
        .into_iter()
        .try_fold(sizes, |acc, len| acc.checked_mul(len as u64))
        .ok_or_else(|| InputError::SpaceTooLarge {
            message: format!(
                "{} sizes x {} block sizes x {} x {} grid values overflows",
                sizes,
                self.block_sizes.len(),
                self.grid_rows.len(),
                self.grid_cols.len()
            ),
        })
    }

    /// Every combination in canonical order: N outermost, then NB, then P,
    /// then Q. Lazy, so callers only pay for what they take.
    pub fn shapes(&self) -> impl Iterator<Item = ProblemShape> + '_ {
        self.sizes
            .values()
            .flat_map(move |n| self.block_sizes.iter().map(move |&nb| (n, nb)))
            .flat_map(move |(n, nb)| self.grid_rows.iter().map(move |&p| (n, nb, p)))
            .flat_map(move |(n, nb, p)| {
                self.grid_cols
                    .iter()
                    .map(move |&q| ProblemShape { n, nb, p, q })
            })
    }
}

/// Wire form of a generation request as sent by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub size_range: ParameterRange,
    pub block_sizes: Vec<u32>,
    pub p_values: Vec<u32>,
    pub q_values: Vec<u32>,
    #[serde(default)]
    pub max_combinations: Option<usize>,
}

impl GenerationRequest {
    /// Validate the raw lists into a [`SweepSpace`].
    pub fn to_space(&self) -> Result<SweepSpace, InputError> {
        self.size_range.validate()?;
        Ok(SweepSpace::new(
            self.size_range,
            DiscreteSet::new("block_sizes", self.block_sizes.clone())?,
            DiscreteSet::new("p_values", self.p_values.clone())?,
            DiscreteSet::new("q_values", self.q_values.clone())?,
        ))
    }

    /// Requested cap, or the default when none was given.
    pub fn cap(&self) -> usize {
        self.max_combinations.unwrap_or(DEFAULT_COMBINATION_CAP)
    }
}

/// Generated configurations plus an explicit account of any truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Size of the full cartesian product.
    pub total_requested: u64,
    /// Number of configurations actually emitted.
    pub total_generated: usize,
    pub truncated: bool,
    pub configurations: Vec<SweepConfiguration>,
}

/// Expand `space` into at most `cap` configurations with sequential ids.
///
/// When the full product exceeds `cap`, the first `cap` combinations in
/// canonical order are returned and `truncated` is set. Identical inputs
/// always produce identical output.
pub fn generate_sweep(space: &SweepSpace, cap: usize) -> HsResult<GenerationResponse> {
    if cap < 1 || cap > ConfigId::MAX as usize {
        return Err(InputError::InvalidCap { cap }.into());
    }
    let total_requested = space.total_combinations()?;

    let configurations: Vec<SweepConfiguration> = space
        .shapes()
        .take(cap)
        .zip(1..)
        .map(|(shape, id)| SweepConfiguration::new(id, shape))
        .collect();

    let total_generated = configurations.len();
    let truncated = total_requested > total_generated as u64;

    if truncated {
        warn!(
            total_requested,
            total_generated, cap, "sweep space truncated to combination cap"
        );
    } else {
        debug!(total_generated, "generated full sweep space");
    }

    Ok(GenerationResponse {
        total_requested,
        total_generated,
        truncated,
        configurations,
    })
}
