// HPL Sweep engine
// Ties sweep generation, the scheduler adapter and the store together.

pub mod aggregator;
pub mod config;
pub mod dispatcher;
mod pool;
pub mod session;

#[cfg(test)]
mod testing;

use hs_scheduler::{ClusterInfo, SchedulerAdapter, TestJobReport};
use hs_store::SweepStore;
use hs_sweep::{
    advise_process_grid, generate_sweep, GenerationRequest, GenerationResponse, GridCandidate,
};
use hs_types::{HsResult, ResourceSpec, StatusSnapshot, Sweep, SweepId, SweepSummary};
use std::sync::Arc;
use tracing::{info, warn};

pub use aggregator::StatusAggregator;
pub use config::EngineConfig;
pub use dispatcher::{
    AcceptedJob, DispatchRequest, DispatchResponse, RejectedJob, SweepDispatcher,
};
pub use session::SchedulerSession;

/// Single entry point over the sweep lifecycle: advise, generate, dispatch,
/// refresh. Every scheduler call made through one engine shares a single
/// [`SchedulerSession`] limit.
pub struct SweepEngine {
    config: EngineConfig,
    session: SchedulerSession,
    store: Arc<dyn SweepStore>,
    dispatcher: SweepDispatcher,
    aggregator: StatusAggregator,
}

impl SweepEngine {
    pub fn new(
        config: EngineConfig,
        adapter: Arc<dyn SchedulerAdapter>,
        store: Arc<dyn SweepStore>,
    ) -> HsResult<Self> {
        config.validate()?;
        info!(adapter = adapter.name(), "initializing HPL sweep engine");

        let session = SchedulerSession::from_config(adapter, &config);
        Ok(Self {
            dispatcher: SweepDispatcher::new(session.clone(), Arc::clone(&store), &config),
            aggregator: StatusAggregator::new(session.clone(), Arc::clone(&store), &config),
            session,
            store,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ranked P x Q grids for `total` MPI processes.
    pub fn advise_grid(&self, total: u64) -> HsResult<Vec<GridCandidate>> {
        advise_process_grid(total)
    }

    /// Expand a generation request. A request may lower the configured
    /// combination cap but not raise it; a larger value is clamped so the
    /// output can always be dispatched.
    pub fn generate(&self, request: &GenerationRequest) -> HsResult<GenerationResponse> {
        let space = request.to_space()?;
        let configured = self.config.combination_cap;
        let cap = match request.max_combinations {
            Some(requested) if requested > configured => {
                warn!(
                    requested,
                    cap = configured,
                    "requested combination cap exceeds the configured one; clamping"
                );
                configured
            }
            Some(requested) => requested,
            None => configured,
        };
        generate_sweep(&space, cap)
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> HsResult<DispatchResponse> {
        self.dispatcher.dispatch(request).await
    }

    pub async fn refresh(&self, sweep_id: SweepId) -> HsResult<StatusSnapshot> {
        self.aggregator.refresh(sweep_id).await
    }

    pub async fn sweep(&self, sweep_id: SweepId) -> HsResult<Sweep> {
        self.store.load(sweep_id).await
    }

    /// Last recorded snapshot, without polling the scheduler.
    pub async fn latest_snapshot(&self, sweep_id: SweepId) -> HsResult<Option<StatusSnapshot>> {
        self.store.latest_snapshot(sweep_id).await
    }

    pub async fn list_sweeps(&self) -> HsResult<Vec<SweepSummary>> {
        self.store.list_sweeps().await
    }

    pub async fn list_partitions(&self) -> HsResult<Vec<String>> {
        let _permit = self.session.permit().await?;
        Ok(self.session.adapter().list_partitions().await?)
    }

    pub async fn cluster_info(&self) -> HsResult<ClusterInfo> {
        let _permit = self.session.permit().await?;
        Ok(self.session.adapter().cluster_info().await?)
    }

    /// Run a short `hostname` job with `resources` to check that the
    /// scheduler accepts them, waiting up to the configured test job wait.
    pub async fn run_test_job(&self, resources: &ResourceSpec) -> HsResult<TestJobReport> {
        resources.validate()?;
        let _permit = self.session.permit().await?;
        let report = self
            .session
            .adapter()
            .run_test_job(resources, self.config.test_job_wait())
            .await?;

        info!(
            job_id = %report.job_id,
            state = %report.job_state,
            passed = report.passed,
            "test job finished"
        );
        Ok(report)
    }
}
