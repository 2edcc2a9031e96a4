//! Turns a validated list of configurations into scheduler jobs and a
//! persisted sweep.

use chrono::Utc;
use hs_scheduler::{SchedulerAdapter, SubmissionRequest};
use hs_store::SweepStore;
use hs_sweep::check_configuration;
use hs_types::{
    default_sweep_name, ConfigId, HplTuning, HsResult, InputError, ProblemShape, ResourceSpec,
    SchedulerError, SubmittedJob, Sweep, SweepConfiguration, SweepId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::pool::run_ordered;
use crate::session::SchedulerSession;

/// A batch of configurations to submit under one set of resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub configurations: Vec<SweepConfiguration>,
    #[serde(flatten)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub tuning: HplTuning,
}

impl DispatchRequest {
    pub fn new(configurations: Vec<SweepConfiguration>, resources: ResourceSpec) -> Self {
        Self {
            name: None,
            configurations,
            resources,
            tuning: HplTuning::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tuning(mut self, tuning: HplTuning) -> Self {
        self.tuning = tuning;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedJob {
    pub config_id: ConfigId,
    pub external_job_id: String,
    pub config: ProblemShape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedJob {
    pub config_id: ConfigId,
    pub error: String,
    pub config: ProblemShape,
}

/// Outcome of a dispatch, split into accepted and rejected submissions.
/// Both lists follow configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub sweep_id: SweepId,
    pub sweep_name: String,
    pub submitted_count: usize,
    pub failed_count: usize,
    pub submitted_jobs: Vec<AcceptedJob>,
    pub failed_jobs: Vec<RejectedJob>,
}

impl DispatchResponse {
    pub fn from_sweep(sweep: &Sweep) -> Self {
        let mut submitted_jobs = Vec::new();
        let mut failed_jobs = Vec::new();

        for job in &sweep.submitted_jobs {
            match (job.external_job_id(), job.submission_error()) {
                (Some(external_job_id), _) => submitted_jobs.push(AcceptedJob {
                    config_id: job.config_id,
                    external_job_id: external_job_id.to_string(),
                    config: job.config,
                }),
                (None, error) => failed_jobs.push(RejectedJob {
                    config_id: job.config_id,
                    error: error.unwrap_or_default().to_string(),
                    config: job.config,
                }),
            }
        }

        Self {
            sweep_id: sweep.id,
            sweep_name: sweep.name.clone(),
            submitted_count: submitted_jobs.len(),
            failed_count: failed_jobs.len(),
            submitted_jobs,
            failed_jobs,
        }
    }
}

/// Submits every configuration of a request and records the sweep.
pub struct SweepDispatcher {
    session: SchedulerSession,
    store: Arc<dyn SweepStore>,
    combination_cap: usize,
    max_parallel: usize,
}

impl SweepDispatcher {
    pub fn new(session: SchedulerSession, store: Arc<dyn SweepStore>, config: &EngineConfig) -> Self {
        Self {
            session,
            store,
            combination_cap: config.combination_cap,
            max_parallel: config.max_parallel_submissions,
        }
    }

    /// Submit all configurations, persist the resulting sweep and report
    /// which submissions were accepted.
    ///
    /// Individual rejections are recorded on the sweep. Losing the scheduler
    /// mid-batch fails the whole call and nothing is stored; submissions
    /// already under way are awaited and any job they created is logged.
    pub async fn dispatch(&self, request: DispatchRequest) -> HsResult<DispatchResponse> {
        self.validate(&request)?;
        self.log_advisories(&request);

        self.session.check_available().await?;

        let sweep_id = Uuid::new_v4();
        let created_at = Utc::now();
        let name = request
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_sweep_name(created_at));

        info!(
            sweep_id = %sweep_id,
            configurations = request.configurations.len(),
            adapter = self.session.name(),
            "dispatching sweep"
        );

        let submissions: Vec<SubmissionRequest> = request
            .configurations
            .iter()
            .map(|configuration| SubmissionRequest {
                sweep_id,
                configuration: *configuration,
                resources: request.resources.clone(),
                tuning: request.tuning,
            })
            .collect();

        let adapter = Arc::clone(self.session.adapter());
        let permits = self.session.permits();
        let outcome = run_ordered(submissions, self.max_parallel, permits, move |submission| {
            let adapter = Arc::clone(&adapter);
            async move { submit_one(adapter.as_ref(), submission).await }
        })
        .await;

        let submitted_jobs = match outcome {
            Ok(jobs) => jobs,
            Err(aborted) => {
                let orphaned: Vec<&str> = aborted
                    .completed
                    .iter()
                    .filter_map(SubmittedJob::external_job_id)
                    .collect();
                if !orphaned.is_empty() {
                    error!(
                        sweep_id = %sweep_id,
                        orphaned_jobs = ?orphaned,
                        "dispatch aborted after the scheduler accepted jobs; they are not tracked"
                    );
                }
                return Err(aborted.error);
            }
        };

        let sweep = Sweep {
            id: sweep_id,
            name,
            created_at,
            resource_spec: request.resources,
            tuning: request.tuning,
            configurations: request.configurations,
            submitted_jobs,
        };
        self.store.save(&sweep).await?;

        let response = DispatchResponse::from_sweep(&sweep);
        info!(
            sweep_id = %sweep.id,
            submitted = response.submitted_count,
            failed = response.failed_count,
            "sweep dispatched"
        );
        Ok(response)
    }

    fn validate(&self, request: &DispatchRequest) -> Result<(), InputError> {
        let count = request.configurations.len();
        if count == 0 {
            return Err(InputError::EmptySweep);
        }
        if count > self.combination_cap {
            return Err(InputError::TooManyConfigurations {
                count,
                cap: self.combination_cap,
            });
        }

        let mut seen = HashSet::with_capacity(count);
        for configuration in &request.configurations {
            if !seen.insert(configuration.id) {
                return Err(InputError::DuplicateConfigurationId {
                    id: configuration.id,
                });
            }
        }

        request.resources.validate()
    }

    fn log_advisories(&self, request: &DispatchRequest) {
        for configuration in &request.configurations {
            for issue in check_configuration(configuration, &request.resources) {
                warn!(config_id = configuration.id, issue = %issue, "questionable configuration");
            }
        }
    }
}

async fn submit_one(
    adapter: &dyn SchedulerAdapter,
    submission: SubmissionRequest,
) -> HsResult<SubmittedJob> {
    let config_id = submission.configuration.id;

    match adapter.submit(&submission).await {
        Ok(external_job_id) => {
            debug!(config_id, job_id = %external_job_id, "configuration accepted");
            Ok(SubmittedJob::accepted(&submission.configuration, external_job_id))
        }
        Err(err) if err.is_transport() => Err(err.into()),
        Err(err) => {
            warn!(config_id, error = %err, "configuration rejected");
            let message = match err {
                SchedulerError::Rejected { reason } => reason,
                other => other.to_string(),
            };
            Ok(SubmittedJob::rejected(&submission.configuration, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{configurations, job_id, MockScheduler};
    use hs_store::MemoryStore;
    use hs_types::HsError;

    fn resources() -> ResourceSpec {
        ResourceSpec::new(2, 4, "compute")
    }

    fn dispatcher(adapter: Arc<MockScheduler>, store: Arc<MemoryStore>) -> SweepDispatcher {
        let config = EngineConfig::default();
        SweepDispatcher::new(SchedulerSession::from_config(adapter, &config), store, &config)
    }

    #[tokio::test]
    async fn rejected_submission_is_reported_separately() {
        let adapter = Arc::new(MockScheduler::new().rejecting(3));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(adapter.clone(), store.clone());

        let response = dispatcher
            .dispatch(DispatchRequest::new(configurations(5), resources()).with_name("nb study"))
            .await
            .unwrap();

        assert_eq!(response.sweep_name, "nb study");
        assert_eq!(response.submitted_count, 4);
        assert_eq!(response.failed_count, 1);
        let accepted: Vec<ConfigId> = response.submitted_jobs.iter().map(|j| j.config_id).collect();
        assert_eq!(accepted, vec![1, 2, 4, 5]);
        assert_eq!(response.submitted_jobs[2].external_job_id, job_id(4));
        assert_eq!(response.failed_jobs[0].config_id, 3);
        assert_eq!(response.failed_jobs[0].error, "invalid partition");

        // The stored sweep keeps every attempt.
        let sweep = store.load(response.sweep_id).await.unwrap();
        assert_eq!(sweep.submitted_jobs.len(), 5);
        assert_eq!(sweep.submitted_count(), 4);
        assert_eq!(
            sweep.submitted_jobs[2].submission_error(),
            Some("invalid partition")
        );
    }

    #[tokio::test]
    async fn results_follow_configuration_order_under_uneven_latency() {
        let adapter = Arc::new(
            MockScheduler::new()
                .with_latency(1, 40)
                .with_latency(2, 30)
                .with_latency(3, 20)
                .with_latency(4, 10),
        );
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(adapter.clone(), store.clone());

        let response = dispatcher
            .dispatch(DispatchRequest::new(configurations(5), resources()))
            .await
            .unwrap();

        let ids: Vec<String> = response
            .submitted_jobs
            .iter()
            .map(|j| j.external_job_id.clone())
            .collect();
        assert_eq!(ids, (1..=5).map(job_id).collect::<Vec<_>>());
        assert!(adapter.peak_in_flight.load(std::sync::atomic::Ordering::SeqCst) <= 4);
        assert!(response.sweep_name.starts_with("HPL sweep "));
    }

    #[tokio::test]
    async fn unreachable_scheduler_aborts_without_persisting() {
        let adapter = Arc::new(MockScheduler::new().unreachable_at(3));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(adapter.clone(), store.clone());

        let err = dispatcher
            .dispatch(DispatchRequest::new(configurations(5), resources()))
            .await
            .unwrap_err();

        assert!(matches!(err, HsError::SchedulerUnavailable { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn submissions_under_way_finish_when_scheduler_is_lost() {
        // Configuration 1 is still in sbatch when 2 loses the session.
        let adapter = Arc::new(MockScheduler::new().with_latency(1, 50).unreachable_at(2));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(adapter.clone(), store.clone());

        let err = dispatcher
            .dispatch(DispatchRequest::new(configurations(3), resources()))
            .await
            .unwrap_err();

        assert!(matches!(err, HsError::SchedulerUnavailable { .. }));
        assert_eq!(adapter.submitted.lock().as_slice(), &[1]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failed_availability_check_submits_nothing() {
        let adapter = Arc::new(MockScheduler::new());
        adapter.set_down(true);
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(adapter.clone(), store.clone());

        let err = dispatcher
            .dispatch(DispatchRequest::new(configurations(2), resources()))
            .await
            .unwrap_err();

        assert!(matches!(err, HsError::SchedulerUnavailable { .. }));
        assert!(adapter.submitted.lock().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_submission() {
        let adapter = Arc::new(MockScheduler::new());
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            combination_cap: 3,
            ..EngineConfig::default()
        };
        let dispatcher = SweepDispatcher::new(
            SchedulerSession::from_config(adapter.clone(), &config),
            store.clone(),
            &config,
        );

        let empty = dispatcher
            .dispatch(DispatchRequest::new(Vec::new(), resources()))
            .await;
        assert!(matches!(
            empty,
            Err(HsError::InvalidInput(InputError::EmptySweep))
        ));

        let too_many = dispatcher
            .dispatch(DispatchRequest::new(configurations(4), resources()))
            .await;
        assert!(matches!(
            too_many,
            Err(HsError::InvalidInput(InputError::TooManyConfigurations { count: 4, cap: 3 }))
        ));

        let mut duplicated = configurations(2);
        duplicated[1].id = 1;
        let duplicate = dispatcher
            .dispatch(DispatchRequest::new(duplicated, resources()))
            .await;
        assert!(matches!(
            duplicate,
            Err(HsError::InvalidInput(InputError::DuplicateConfigurationId { id: 1 }))
        ));

        let no_partition = dispatcher
            .dispatch(DispatchRequest::new(configurations(1), ResourceSpec::new(1, 8, "")))
            .await;
        assert!(matches!(
            no_partition,
            Err(HsError::InvalidInput(InputError::InvalidResources { .. }))
        ));

        assert!(adapter.submitted.lock().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn request_wire_format_flattens_resources() {
        let json = r#"{
            "configurations": [{"id": 1, "n": 20000, "nb": 192, "p": 2, "q": 4}],
            "nodes": 2,
            "cpus_per_node": 4,
            "partition": "compute"
        }"#;
        let request: DispatchRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.name, None);
        assert_eq!(request.resources.total_processes(), 8);
        assert_eq!(request.resources.executable_path, "xhpl");
        assert_eq!(request.tuning, HplTuning::default());
    }
}
