//! In-process sweep store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hs_types::{HsResult, StatusSnapshot, StoreError, Sweep, SweepId, SweepSummary};
use parking_lot::RwLock;
use tracing::debug;

use crate::SweepStore;

/// A sweep together with its snapshot history.
#[derive(Debug)]
struct StoredSweep {
    sweep: Sweep,
    snapshots: Vec<StatusSnapshot>,
}

/// Keeps everything in memory. Sweeps live in separate map entries, so two
/// sweeps never contend on the same lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sweeps: DashMap<SweepId, RwLock<StoredSweep>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sweeps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }
}

fn not_found(sweep_id: SweepId) -> StoreError {
    StoreError::NotFound {
        sweep_id: sweep_id.to_string(),
    }
}

#[async_trait]
impl SweepStore for MemoryStore {
    async fn save(&self, sweep: &Sweep) -> HsResult<()> {
        match self.sweeps.entry(sweep.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                sweep_id: sweep.id.to_string(),
            }
            .into()),
            Entry::Vacant(slot) => {
                slot.insert(RwLock::new(StoredSweep {
                    sweep: sweep.clone(),
                    snapshots: Vec::new(),
                }));
                debug!(sweep_id = %sweep.id, "stored sweep in memory");
                Ok(())
            }
        }
    }

    async fn load(&self, sweep_id: SweepId) -> HsResult<Sweep> {
        let entry = self.sweeps.get(&sweep_id).ok_or_else(|| not_found(sweep_id))?;
        let sweep = entry.read().sweep.clone();
        Ok(sweep)
    }

    async fn append_snapshot(&self, sweep_id: SweepId, snapshot: &StatusSnapshot) -> HsResult<()> {
        let entry = self.sweeps.get(&sweep_id).ok_or_else(|| not_found(sweep_id))?;
        entry.write().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn snapshots(&self, sweep_id: SweepId) -> HsResult<Vec<StatusSnapshot>> {
        let entry = self.sweeps.get(&sweep_id).ok_or_else(|| not_found(sweep_id))?;
        let snapshots = entry.read().snapshots.clone();
        Ok(snapshots)
    }

    async fn latest_snapshot(&self, sweep_id: SweepId) -> HsResult<Option<StatusSnapshot>> {
        let entry = self.sweeps.get(&sweep_id).ok_or_else(|| not_found(sweep_id))?;
        let latest = entry.read().snapshots.last().cloned();
        Ok(latest)
    }

    async fn list_sweeps(&self) -> HsResult<Vec<SweepSummary>> {
        let mut summaries: Vec<SweepSummary> = self
            .sweeps
            .iter()
            .map(|entry| entry.value().read().sweep.summary())
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }
}
