//! # hs-store
//!
//! Durable home of sweeps and their status history.
//!
//! A sweep is written once at dispatch time; afterwards only status
//! snapshots are appended. Each append is all-or-nothing, so a concurrent
//! reader sees either the previous snapshot or the complete new one.

use async_trait::async_trait;
use hs_types::{HsResult, StatusSnapshot, Sweep, SweepId, SweepSummary};

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Persistence capability consumed by the sweep engine.
#[async_trait]
pub trait SweepStore: Send + Sync {
    /// Persist a new sweep. Fails with `AlreadyExists` if the id is taken.
    async fn save(&self, sweep: &Sweep) -> HsResult<()>;

    /// Load a sweep. Fails with `NotFound` for unknown ids.
    async fn load(&self, sweep_id: SweepId) -> HsResult<Sweep>;

    /// Atomically append one snapshot to the sweep's history.
    async fn append_snapshot(&self, sweep_id: SweepId, snapshot: &StatusSnapshot) -> HsResult<()>;

    /// Full snapshot history, oldest first.
    async fn snapshots(&self, sweep_id: SweepId) -> HsResult<Vec<StatusSnapshot>>;

    /// Most recent snapshot, if any poll has completed.
    async fn latest_snapshot(&self, sweep_id: SweepId) -> HsResult<Option<StatusSnapshot>> {
        Ok(self.snapshots(sweep_id).await?.pop())
    }

    /// Summaries of every stored sweep, oldest first.
    async fn list_sweeps(&self) -> HsResult<Vec<SweepSummary>>;
}
