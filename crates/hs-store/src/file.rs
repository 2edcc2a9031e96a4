//! JSON-on-disk sweep store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<sweep_id>/sweep.json
//! <root>/<sweep_id>/snapshots/00000001.json
//! <root>/<sweep_id>/snapshots/00000002.json
//! ```
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never observes a partially written sweep or snapshot.

use async_trait::async_trait;
use dashmap::DashMap;
use hs_types::{HsResult, StatusSnapshot, StoreError, Sweep, SweepId, SweepSummary};
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::SweepStore;

const SWEEP_FILE: &str = "sweep.json";
const SNAPSHOT_DIR: &str = "snapshots";

/// Stores each sweep in its own directory of pretty-printed JSON files.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes snapshot appends per sweep; different sweeps never share a lock.
    append_locks: DashMap<SweepId, Arc<Mutex<()>>>,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> HsResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            append_locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sweep_dir(&self, sweep_id: SweepId) -> PathBuf {
        self.root.join(sweep_id.to_string())
    }

    fn append_lock(&self, sweep_id: SweepId) -> Arc<Mutex<()>> {
        self.append_locks.entry(sweep_id).or_default().clone()
    }

    async fn require_sweep(&self, sweep_id: SweepId) -> HsResult<PathBuf> {
        let dir = self.sweep_dir(sweep_id);
        if tokio::fs::try_exists(dir.join(SWEEP_FILE)).await? {
            Ok(dir)
        } else {
            Err(not_found(sweep_id))
        }
    }

    /// Snapshot files in sequence order.
    async fn snapshot_files(&self, sweep_id: SweepId) -> HsResult<Vec<(u64, PathBuf)>> {
        let dir = self.require_sweep(sweep_id).await?.join(SNAPSHOT_DIR);
        let mut files = Vec::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let seq = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok());
            if let Some(seq) = seq {
                files.push((seq, path));
            }
        }
        files.sort_by_key(|(seq, _)| *seq);
        Ok(files)
    }
}

fn not_found(sweep_id: SweepId) -> hs_types::HsError {
    StoreError::NotFound {
        sweep_id: sweep_id.to_string(),
    }
    .into()
}

/// Write `bytes` to `path` through a temporary file and an atomic rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> HsResult<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> HsResult<T> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        StoreError::Corrupted {
            message: format!("{}: {e}", path.display()),
        }
        .into()
    })
}

#[async_trait]
impl SweepStore for JsonFileStore {
    async fn save(&self, sweep: &Sweep) -> HsResult<()> {
        let dir = self.sweep_dir(sweep.id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists {
                    sweep_id: sweep.id.to_string(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(dir.join(SNAPSHOT_DIR)).await?;

        let bytes = serde_json::to_vec_pretty(sweep)?;
        write_atomic(&dir.join(SWEEP_FILE), &bytes).await?;

        debug!(sweep_id = %sweep.id, path = %dir.display(), "stored sweep on disk");
        Ok(())
    }

    async fn load(&self, sweep_id: SweepId) -> HsResult<Sweep> {
        let path = self.sweep_dir(sweep_id).join(SWEEP_FILE);
        match read_json(&path).await {
            Err(hs_types::HsError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(not_found(sweep_id))
            }
            other => other,
        }
    }

    async fn append_snapshot(&self, sweep_id: SweepId, snapshot: &StatusSnapshot) -> HsResult<()> {
        let lock = self.append_lock(sweep_id);
        let _guard = lock.lock().await;

        let dir = self.require_sweep(sweep_id).await?.join(SNAPSHOT_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let next = self
            .snapshot_files(sweep_id)
            .await?
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(1);
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&dir.join(format!("{next:08}.json")), &bytes).await?;

        debug!(sweep_id = %sweep_id, seq = next, "appended status snapshot");
        Ok(())
    }

    async fn snapshots(&self, sweep_id: SweepId) -> HsResult<Vec<StatusSnapshot>> {
        let mut snapshots = Vec::new();
        for (_, path) in self.snapshot_files(sweep_id).await? {
            snapshots.push(read_json(&path).await?);
        }
        Ok(snapshots)
    }

    async fn latest_snapshot(&self, sweep_id: SweepId) -> HsResult<Option<StatusSnapshot>> {
        match self.snapshot_files(sweep_id).await?.pop() {
            Some((_, path)) => Ok(Some(read_json(&path).await?)),
            None => Ok(None),
        }
    }

    async fn list_sweeps(&self) -> HsResult<Vec<SweepSummary>> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(SWEEP_FILE);
            if !tokio::fs::try_exists(&path).await? {
                continue;
            }
            match read_json::<Sweep>(&path).await {
                Ok(sweep) => summaries.push(sweep.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable sweep"),
            }
        }

        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }
}
