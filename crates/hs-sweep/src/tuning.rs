//! Advisory HPL parameter checks.

use hs_types::{ResourceSpec, SweepConfiguration};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest problem size worth benchmarking.
const MIN_PROBLEM_SIZE: u64 = 1000;
const BLOCK_SIZE_RANGE: std::ops::RangeInclusive<u32> = 32..=512;

/// Block sizes that commonly perform well with vendor BLAS libraries.
pub fn recommended_block_sizes() -> &'static [u32] {
    &[64, 96, 128, 160, 192, 224, 256]
}

/// A reason a configuration is unlikely to run well (or at all).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationIssue {
    /// `P * Q` must equal the number of launched ranks.
    GridMismatch { p: u32, q: u32, total_processes: u64 },
    NotBlockAligned { n: u64, nb: u32 },
    ProblemTooSmall { n: u64 },
    BlockSizeOutOfRange { nb: u32 },
}

impl fmt::Display for ConfigurationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GridMismatch {
                p,
                q,
                total_processes,
            } => write!(
                f,
                "P*Q ({}) must equal total processes ({total_processes})",
                u64::from(*p) * u64::from(*q)
            ),
            Self::NotBlockAligned { n, nb } => {
                write!(f, "N ({n}) is not divisible by NB ({nb})")
            }
            Self::ProblemTooSmall { n } => {
                write!(f, "N ({n}) is below {MIN_PROBLEM_SIZE}")
            }
            Self::BlockSizeOutOfRange { nb } => write!(
                f,
                "NB ({nb}) should be between {} and {}",
                BLOCK_SIZE_RANGE.start(),
                BLOCK_SIZE_RANGE.end()
            ),
        }
    }
}

/// Collect every sanity issue of `config` when launched with `resources`.
/// An empty result means the configuration looks reasonable.
pub fn check_configuration(
    config: &SweepConfiguration,
    resources: &ResourceSpec,
) -> Vec<ConfigurationIssue> {
    let mut issues = Vec::new();

    let total_processes = resources.total_processes();
    if u64::from(config.p) * u64::from(config.q) != total_processes {
        issues.push(ConfigurationIssue::GridMismatch {
            p: config.p,
            q: config.q,
            total_processes,
        });
    }
    if config.nb == 0 || config.n % u64::from(config.nb) != 0 {
        issues.push(ConfigurationIssue::NotBlockAligned {
            n: config.n,
            nb: config.nb,
        });
    }
    if config.n < MIN_PROBLEM_SIZE {
        issues.push(ConfigurationIssue::ProblemTooSmall { n: config.n });
    }
    if !BLOCK_SIZE_RANGE.contains(&config.nb) {
        issues.push(ConfigurationIssue::BlockSizeOutOfRange { nb: config.nb });
    }

    issues
}
