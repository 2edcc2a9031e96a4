//! The scheduler adapter as shared by every operation of one engine.

use hs_scheduler::SchedulerAdapter;
use hs_types::{internal_error, HsResult};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::EngineConfig;

/// A scheduler adapter plus the permits bounding calls into it.
///
/// The adapter usually sits on one remote session, so the permits are
/// shared by every dispatch and refresh holding a clone of this handle, not
/// just by the calls of a single operation.
#[derive(Clone)]
pub struct SchedulerSession {
    adapter: Arc<dyn SchedulerAdapter>,
    permits: Arc<Semaphore>,
}

impl SchedulerSession {
    pub fn new(adapter: Arc<dyn SchedulerAdapter>, max_calls: usize) -> Self {
        Self {
            adapter,
            permits: Arc::new(Semaphore::new(max_calls.max(1))),
        }
    }

    pub fn from_config(adapter: Arc<dyn SchedulerAdapter>, config: &EngineConfig) -> Self {
        Self::new(adapter, config.max_session_calls())
    }

    pub fn adapter(&self) -> &Arc<dyn SchedulerAdapter> {
        &self.adapter
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub(crate) fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    /// Permit for a single call made outside a batch.
    pub(crate) async fn permit(&self) -> HsResult<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|e| internal_error!("scheduler session limiter closed: {e}"))
    }

    pub(crate) async fn check_available(&self) -> HsResult<()> {
        let _permit = self.permit().await?;
        self.adapter.check_available().await?;
        Ok(())
    }
}
