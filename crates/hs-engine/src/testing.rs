//! Scriptable scheduler used by the engine tests.

use async_trait::async_trait;
use hs_scheduler::{ClusterInfo, RawJobStatus, SchedulerAdapter, SubmissionRequest, TestJobReport};
use hs_types::{
    ConfigId, ProblemShape, ResourceSpec, SchedulerError, SchedulerResult, SweepConfiguration,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// What the mock answers when a job is queried.
#[derive(Debug, Clone)]
pub enum QueryReply {
    State(&'static str),
    NotFound,
    Fail(&'static str),
    Unreachable,
}

/// External id the mock assigns to a configuration.
pub fn job_id(config_id: ConfigId) -> String {
    format!("{}", 1000 + config_id)
}

#[derive(Debug, Default)]
pub struct MockScheduler {
    rejected: HashSet<ConfigId>,
    unreachable_at: Option<ConfigId>,
    latency_ms: HashMap<ConfigId, u64>,
    replies: Mutex<HashMap<String, QueryReply>>,
    down: AtomicBool,
    pub submitted: Mutex<Vec<ConfigId>>,
    pub queried: Mutex<Vec<String>>,
    pub test_jobs: Mutex<Vec<(ResourceSpec, Duration)>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, config_id: ConfigId) -> Self {
        self.rejected.insert(config_id);
        self
    }

    /// Submitting this configuration reports the scheduler as unreachable.
    pub fn unreachable_at(mut self, config_id: ConfigId) -> Self {
        self.unreachable_at = Some(config_id);
        self
    }

    pub fn with_latency(mut self, config_id: ConfigId, ms: u64) -> Self {
        self.latency_ms.insert(config_id, ms);
        self
    }

    pub fn reply(&self, config_id: ConfigId, reply: QueryReply) {
        self.replies.lock().insert(job_id(config_id), reply);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    async fn pause(&self, config_id: ConfigId) {
        if let Some(ms) = self.latency_ms.get(&config_id) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SchedulerAdapter for MockScheduler {
    async fn check_available(&self) -> SchedulerResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SchedulerError::Unavailable {
                message: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn submit(&self, request: &SubmissionRequest) -> SchedulerResult<String> {
        let config_id = request.configuration.id;
        self.enter();
        self.pause(config_id).await;
        self.leave();

        if self.unreachable_at == Some(config_id) {
            return Err(SchedulerError::Unavailable {
                message: "session dropped".into(),
            });
        }
        self.submitted.lock().push(config_id);
        if self.rejected.contains(&config_id) {
            return Err(SchedulerError::Rejected {
                reason: "invalid partition".into(),
            });
        }
        Ok(job_id(config_id))
    }

    async fn query(&self, external_job_id: &str) -> SchedulerResult<RawJobStatus> {
        let config_id: ConfigId = external_job_id.parse::<ConfigId>().unwrap_or(1000) - 1000;
        self.enter();
        self.pause(config_id).await;
        self.leave();

        self.queried.lock().push(external_job_id.to_string());
        let reply = self
            .replies
            .lock()
            .get(external_job_id)
            .cloned()
            .unwrap_or(QueryReply::State("PENDING"));

        match reply {
            QueryReply::State(state) => Ok(RawJobStatus {
                state: state.to_string(),
                reason: (state == "PENDING").then(|| "Priority".to_string()),
                in_queue: true,
                ..RawJobStatus::default()
            }),
            QueryReply::NotFound => Err(SchedulerError::JobNotFound {
                job_id: external_job_id.to_string(),
            }),
            QueryReply::Fail(message) => Err(SchedulerError::QueryFailed {
                message: message.to_string(),
            }),
            QueryReply::Unreachable => Err(SchedulerError::Unavailable {
                message: "session dropped".into(),
            }),
        }
    }

    async fn list_partitions(&self) -> SchedulerResult<Vec<String>> {
        Ok(vec!["compute".to_string(), "debug".to_string()])
    }

    async fn cluster_info(&self) -> SchedulerResult<ClusterInfo> {
        Ok(ClusterInfo {
            scheduler_version: Some("mock 1.0".to_string()),
            total_nodes: Some(16),
        })
    }

    async fn run_test_job(
        &self,
        resources: &ResourceSpec,
        wait: Duration,
    ) -> SchedulerResult<TestJobReport> {
        self.enter();
        tokio::task::yield_now().await;
        self.leave();
        self.test_jobs.lock().push((resources.clone(), wait));
        Ok(TestJobReport {
            job_id: "42".to_string(),
            job_state: "COMPLETED".to_string(),
            passed: true,
            output: Some("=== Test Complete ===".to_string()),
            nodes: resources.nodes,
            cpus_per_node: resources.cpus_per_node,
            partition: resources.partition.clone(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// `count` configurations with ids `1..=count`.
pub fn configurations(count: u32) -> Vec<SweepConfiguration> {
    (1..=count)
        .map(|id| {
            SweepConfiguration::new(
                id,
                ProblemShape {
                    n: 10_000 + u64::from(id) * 1000,
                    nb: 128,
                    p: 2,
                    q: 4,
                },
            )
        })
        .collect()
}
