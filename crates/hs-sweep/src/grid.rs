//! Process-grid advice: ranked P x Q splits of a total MPI rank count.

use hs_types::{HsResult, InputError};
use serde::{Deserialize, Serialize};

/// One candidate process grid with `p <= q` and `p * q` equal to the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCandidate {
    pub p: u64,
    pub q: u64,
    /// Distance of `p` from `sqrt(total)`; smaller is closer to square.
    pub distance: f64,
    pub description: String,
}

impl GridCandidate {
    fn new(p: u64, q: u64, root: f64) -> Self {
        let description = if p == q {
            format!("{p} x {q} (square grid)")
        } else {
            format!("{p} x {q} (Q = {:.1} x P)", q as f64 / p as f64)
        };
        Self {
            p,
            q,
            distance: (root - p as f64).abs(),
            description,
        }
    }
}

/// Rank every `(P, Q)` split of `total` processes, near-square grids first.
///
/// Balanced grids spread the trailing-matrix update evenly, so they are
/// usually the fastest choice for HPL. Prime totals yield the single pair
/// `(1, total)`.
pub fn advise_process_grid(total: u64) -> HsResult<Vec<GridCandidate>> {
    if total < 1 {
        return Err(InputError::InvalidProcessCount { total }.into());
    }

    let root = (total as f64).sqrt();
    let mut candidates: Vec<GridCandidate> = (1..)
        .take_while(|&d: &u64| d <= total / d)
        .filter(|d| total % d == 0)
        .map(|d| GridCandidate::new(d, total / d, root))
        .collect();

    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.p.cmp(&b.p)));
    Ok(candidates)
}
