//! Polls the scheduler for every accepted job of a sweep and records a
//! status snapshot.

use chrono::Utc;
use hs_scheduler::SchedulerAdapter;
use hs_store::SweepStore;
use hs_types::{
    CanonicalState, HsResult, JobObservation, JobStatusDetail, SchedulerError, StatusSnapshot,
    SubmittedJob, SweepId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::pool::run_ordered;
use crate::session::SchedulerSession;

pub struct StatusAggregator {
    session: SchedulerSession,
    store: Arc<dyn SweepStore>,
    max_parallel: usize,
}

impl StatusAggregator {
    pub fn new(session: SchedulerSession, store: Arc<dyn SweepStore>, config: &EngineConfig) -> Self {
        Self {
            session,
            store,
            max_parallel: config.max_parallel_queries,
        }
    }

    /// Query every accepted job of the sweep, then append and return the
    /// resulting snapshot.
    ///
    /// Jobs appear in submission order. A job whose query failed is listed
    /// with its error but left out of the state counts. If the scheduler
    /// cannot be reached at all, no snapshot is stored.
    pub async fn refresh(&self, sweep_id: SweepId) -> HsResult<StatusSnapshot> {
        let sweep = self.store.load(sweep_id).await?;
        let jobs: Vec<SubmittedJob> = sweep.pollable_jobs().cloned().collect();

        if !jobs.is_empty() {
            self.session.check_available().await?;
        }
        debug!(sweep_id = %sweep_id, jobs = jobs.len(), "polling sweep");

        let adapter = Arc::clone(self.session.adapter());
        let details = run_ordered(jobs, self.max_parallel, self.session.permits(), move |job| {
            let adapter = Arc::clone(&adapter);
            async move { observe(adapter.as_ref(), job).await }
        })
        .await?;

        let snapshot = StatusSnapshot::from_jobs(Utc::now(), details);
        self.store.append_snapshot(sweep_id, &snapshot).await?;

        info!(
            sweep_id = %sweep_id,
            jobs = snapshot.jobs.len(),
            errors = snapshot.error_count(),
            settled = snapshot.is_settled(),
            "status snapshot recorded"
        );
        Ok(snapshot)
    }
}

async fn observe(adapter: &dyn SchedulerAdapter, job: SubmittedJob) -> HsResult<JobStatusDetail> {
    let external_job_id = job.external_job_id().unwrap_or_default().to_string();
    let mut detail = JobStatusDetail {
        config_id: job.config_id,
        external_job_id,
        config: job.config,
        observation: JobObservation::Observed {
            canonical_state: CanonicalState::NotFound,
            raw_state: CanonicalState::NotFound.as_str().to_string(),
        },
        reason: None,
        exit_code: None,
        time_used: None,
        time_left: None,
    };

    match adapter.query(&detail.external_job_id).await {
        Ok(raw) => {
            let canonical_state = CanonicalState::from_raw(&raw.state);
            if canonical_state == CanonicalState::Unknown {
                warn!(
                    job_id = %detail.external_job_id,
                    raw_state = %raw.state,
                    "unrecognized scheduler state"
                );
            }
            detail.observation = JobObservation::Observed {
                canonical_state,
                raw_state: raw.state,
            };
            detail.reason = raw.reason;
            detail.exit_code = raw.exit_code;
            detail.time_used = raw.time_used;
            detail.time_left = raw.time_left;
        }
        Err(SchedulerError::JobNotFound { .. }) => {
            debug!(job_id = %detail.external_job_id, "job no longer known to the scheduler");
        }
        Err(err) if err.is_transport() => return Err(err.into()),
        Err(err) => {
            warn!(job_id = %detail.external_job_id, error = %err, "status query failed");
            detail.observation = JobObservation::QueryFailed {
                error: err.to_string(),
            };
        }
    }

    Ok(detail)
}
