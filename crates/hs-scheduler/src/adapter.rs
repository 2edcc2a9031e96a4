//! Scheduler abstraction consumed by the sweep engine.

use async_trait::async_trait;
use hs_types::{
    HplTuning, ResourceSpec, SchedulerError, SchedulerResult, SweepConfiguration, SweepId,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything an adapter needs to turn one configuration into a remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub sweep_id: SweepId,
    pub configuration: SweepConfiguration,
    pub resources: ResourceSpec,
    pub tuning: HplTuning,
}

/// Scheduler-specific state of one job, as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawJobStatus {
    /// State string in the scheduler's own vocabulary.
    pub state: String,
    /// Pending/hold reason, when the scheduler gives one.
    pub reason: Option<String>,
    pub time_used: Option<String>,
    pub time_left: Option<String>,
    pub exit_code: Option<String>,
    /// Whether the job is still in the live queue (as opposed to accounting).
    pub in_queue: bool,
}

impl RawJobStatus {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Self::default()
        }
    }
}

/// Cluster-wide facts shown when checking a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub scheduler_version: Option<String>,
    /// Sum of node counts over every partition row; `None` if unparsable.
    pub total_nodes: Option<u64>,
}

/// Outcome of a short `hostname` job used to check a resource request
/// before committing a sweep to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestJobReport {
    pub job_id: String,
    /// Last raw state seen before the job left the queue or the wait ran out.
    pub job_state: String,
    /// The job ran its script to the end on the allocated nodes.
    pub passed: bool,
    pub output: Option<String>,
    pub nodes: u32,
    pub cpus_per_node: u32,
    pub partition: String,
}

/// Submit/query capability against a remote batch scheduler.
///
/// Implementations typically sit on a single serialized remote session; the
/// engine bounds how many calls it has in flight at once.
#[async_trait]
pub trait SchedulerAdapter: Send + Sync {
    /// Cheap reachability check issued before a batch of calls. A
    /// [`hs_types::SchedulerError::Unavailable`] here fails the whole
    /// operation before anything is submitted.
    async fn check_available(&self) -> SchedulerResult<()> {
        Ok(())
    }

    /// Submit one job. Returns the scheduler-assigned job id.
    async fn submit(&self, request: &SubmissionRequest) -> SchedulerResult<String>;

    /// Query the current raw state of a previously submitted job. A job the
    /// scheduler no longer knows is reported as
    /// [`hs_types::SchedulerError::JobNotFound`].
    async fn query(&self, external_job_id: &str) -> SchedulerResult<RawJobStatus>;

    /// Partitions the submitting user can target.
    async fn list_partitions(&self) -> SchedulerResult<Vec<String>> {
        Err(self.unsupported("partition listing"))
    }

    async fn cluster_info(&self) -> SchedulerResult<ClusterInfo> {
        Err(self.unsupported("cluster info"))
    }

    /// Submit a `hostname` job with `resources` and wait up to `wait` for it
    /// to finish.
    async fn run_test_job(
        &self,
        _resources: &ResourceSpec,
        _wait: Duration,
    ) -> SchedulerResult<TestJobReport> {
        Err(self.unsupported("test jobs"))
    }

    /// Human-readable adapter name.
    fn name(&self) -> &str;

    fn unsupported(&self, operation: &str) -> SchedulerError {
        SchedulerError::Unsupported {
            adapter: self.name().to_string(),
            operation: operation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SubmitOnly;

    #[async_trait]
    impl SchedulerAdapter for SubmitOnly {
        async fn submit(&self, _request: &SubmissionRequest) -> SchedulerResult<String> {
            Ok("1".to_string())
        }

        async fn query(&self, _external_job_id: &str) -> SchedulerResult<RawJobStatus> {
            Ok(RawJobStatus::new("RUNNING"))
        }

        fn name(&self) -> &str {
            "submit-only"
        }
    }

    #[tokio::test]
    async fn optional_calls_report_unsupported() {
        let adapter = SubmitOnly;
        assert!(adapter.check_available().await.is_ok());

        match adapter.cluster_info().await {
            Err(SchedulerError::Unsupported { adapter, operation }) => {
                assert_eq!(adapter, "submit-only");
                assert_eq!(operation, "cluster info");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            adapter.list_partitions().await,
            Err(SchedulerError::Unsupported { .. })
        ));
        assert!(matches!(
            adapter
                .run_test_job(&ResourceSpec::new(1, 4, "debug"), Duration::ZERO)
                .await,
            Err(SchedulerError::Unsupported { .. })
        ));
    }
}
