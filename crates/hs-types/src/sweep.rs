use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::InputError;

/// Unique sweep identifier
pub type SweepId = Uuid;

/// Sequential configuration id within a sweep, starting at 1.
pub type ConfigId = u32;

/// Closed arithmetic progression over the problem size N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub start: u64,
    pub end: u64,
    pub step: u64,
}

impl ParameterRange {
    pub fn new(start: u64, end: u64, step: u64) -> Result<Self, InputError> {
        let range = Self { start, end, step };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let message = if self.step == 0 {
            "step must be positive"
        } else if self.end < self.start {
            "end must not be below start"
        } else {
            return Ok(());
        };
        Err(InputError::MalformedRange {
            start: self.start,
            end: self.end,
            step: self.step,
            message: message.to_string(),
        })
    }

    /// Number of values in the progression, `None` when it does not fit in
    /// a `u64` (only `0..=u64::MAX` with step 1). Only meaningful for a valid
    /// range.
    pub fn count(&self) -> Option<u64> {
        self.last_index().checked_add(1)
    }

    fn last_index(&self) -> u64 {
        (self.end - self.start) / self.step
    }

    /// The `i`-th value of the progression.
    pub fn nth(&self, i: u64) -> u64 {
        self.start + i * self.step
    }

    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        (0..=self.last_index()).map(move |i| self.nth(i))
    }
}

/// Non-empty set of admissible values, kept in insertion order.
///
/// Duplicates are dropped on construction (the first occurrence keeps its
/// position), so enumeration over the set is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
pub struct DiscreteSet<T: Clone + PartialEq> {
    values: Vec<T>,
}

impl<T: Clone + PartialEq> DiscreteSet<T> {
    /// Build a set for the named parameter, failing if `values` is empty.
    pub fn new(parameter: &str, values: Vec<T>) -> Result<Self, InputError> {
        let mut unique: Vec<T> = Vec::with_capacity(values.len());
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        if unique.is_empty() {
            return Err(InputError::EmptySet {
                parameter: parameter.to_string(),
            });
        }
        Ok(Self { values: unique })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }
}

impl<T: Clone + PartialEq> TryFrom<Vec<T>> for DiscreteSet<T> {
    type Error = InputError;

    fn try_from(values: Vec<T>) -> Result<Self, Self::Error> {
        Self::new("discrete set", values)
    }
}

impl<T: Clone + PartialEq> From<DiscreteSet<T>> for Vec<T> {
    fn from(set: DiscreteSet<T>) -> Self {
        set.values
    }
}

/// The HPL problem parameters of one run, without its sweep-local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProblemShape {
    /// Problem size N.
    pub n: u64,
    /// Block size NB.
    pub nb: u32,
    /// Process grid rows P.
    pub p: u32,
    /// Process grid columns Q.
    pub q: u32,
}

/// One concrete run of the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SweepConfiguration {
    pub id: ConfigId,
    pub n: u64,
    pub nb: u32,
    pub p: u32,
    pub q: u32,
}

impl SweepConfiguration {
    pub fn new(id: ConfigId, shape: ProblemShape) -> Self {
        Self {
            id,
            n: shape.n,
            nb: shape.nb,
            p: shape.p,
            q: shape.q,
        }
    }

    pub fn shape(&self) -> ProblemShape {
        ProblemShape {
            n: self.n,
            nb: self.nb,
            p: self.p,
            q: self.q,
        }
    }
}

/// Cluster resources shared by every job of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub nodes: u32,
    pub cpus_per_node: u32,
    pub partition: String,
    #[serde(default = "default_executable_path")]
    pub executable_path: String,
    #[serde(default = "default_time_limit")]
    pub time_limit: String,
}

fn default_executable_path() -> String {
    "xhpl".to_string()
}

fn default_time_limit() -> String {
    "01:00:00".to_string()
}

impl ResourceSpec {
    pub fn new(nodes: u32, cpus_per_node: u32, partition: impl Into<String>) -> Self {
        Self {
            nodes,
            cpus_per_node,
            partition: partition.into(),
            executable_path: default_executable_path(),
            time_limit: default_time_limit(),
        }
    }

    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = path.into();
        self
    }

    pub fn with_time_limit(mut self, limit: impl Into<String>) -> Self {
        self.time_limit = limit.into();
        self
    }

    /// Number of MPI ranks the job launches.
    pub fn total_processes(&self) -> u64 {
        u64::from(self.nodes) * u64::from(self.cpus_per_node)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let problem = if self.nodes == 0 {
            Some("node count must be at least 1")
        } else if self.cpus_per_node == 0 {
            Some("cpus per node must be at least 1")
        } else if self.partition.trim().is_empty() {
            Some("partition must not be empty")
        } else if self.executable_path.trim().is_empty() {
            Some("executable path must not be empty")
        } else if self.time_limit.trim().is_empty() {
            Some("time limit must not be empty")
        } else if has_control_chars(&self.partition) {
            Some("partition must not contain control characters")
        } else if has_control_chars(&self.executable_path) {
            Some("executable path must not contain control characters")
        } else if has_control_chars(&self.time_limit) {
            Some("time limit must not contain control characters")
        } else {
            None
        };

        match problem {
            Some(message) => Err(InputError::InvalidResources {
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

// These values end up on `#SBATCH` lines; a newline would start a new one.
fn has_control_chars(value: &str) -> bool {
    value.chars().any(char::is_control)
}

/// Secondary HPL.dat knobs applied identically to every run of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HplTuning {
    /// Panel factorization (0=left, 1=Crout, 2=right).
    pub pfact: u8,
    /// Recursive stopping criterion.
    pub nbmin: u32,
    /// Panels in recursion.
    pub ndiv: u32,
    /// Recursive panel factorization (0=left, 1=Crout, 2=right).
    pub rfact: u8,
    /// Broadcast topology (0=1rg, 1=1rM, 2=2rg, 3=2rM, 4=Lng, 5=LnM).
    pub bcast: u8,
    /// Lookahead depth.
    pub depth: u32,
    /// Swapping algorithm (0=bin-exch, 1=long, 2=mix).
    pub swap: u8,
    pub swap_threshold: u32,
    /// L1 storage form (0=transposed, 1=no-transposed).
    pub l1: u8,
    /// U storage form (0=transposed, 1=no-transposed).
    pub u: u8,
    pub equil: u8,
    /// Memory alignment in doubles.
    pub align: u32,
}

impl Default for HplTuning {
    fn default() -> Self {
        Self {
            pfact: 2,
            nbmin: 4,
            ndiv: 2,
            rfact: 2,
            bcast: 1,
            depth: 1,
            swap: 2,
            swap_threshold: 64,
            l1: 0,
            u: 0,
            equil: 1,
            align: 8,
        }
    }
}

/// Result of one submission attempt. Exactly one of the two is ever recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionOutcome {
    Accepted { external_job_id: String },
    Rejected { submission_error: String },
}

/// One submission attempt for one configuration of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub config_id: ConfigId,
    pub config: ProblemShape,
    #[serde(flatten)]
    pub outcome: SubmissionOutcome,
}

impl SubmittedJob {
    pub fn accepted(configuration: &SweepConfiguration, external_job_id: impl Into<String>) -> Self {
        Self {
            config_id: configuration.id,
            config: configuration.shape(),
            outcome: SubmissionOutcome::Accepted {
                external_job_id: external_job_id.into(),
            },
        }
    }

    pub fn rejected(configuration: &SweepConfiguration, error: impl Into<String>) -> Self {
        Self {
            config_id: configuration.id,
            config: configuration.shape(),
            outcome: SubmissionOutcome::Rejected {
                submission_error: error.into(),
            },
        }
    }

    pub fn external_job_id(&self) -> Option<&str> {
        match &self.outcome {
            SubmissionOutcome::Accepted { external_job_id } => Some(external_job_id),
            SubmissionOutcome::Rejected { .. } => None,
        }
    }

    pub fn submission_error(&self) -> Option<&str> {
        match &self.outcome {
            SubmissionOutcome::Accepted { .. } => None,
            SubmissionOutcome::Rejected { submission_error } => Some(submission_error),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, SubmissionOutcome::Accepted { .. })
    }
}

/// One dispatched batch of configurations sharing resource parameters.
///
/// Created once by the dispatcher and never changed structurally afterwards;
/// status history lives beside it in the store as snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub id: SweepId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub resource_spec: ResourceSpec,
    #[serde(default)]
    pub tuning: HplTuning,
    pub configurations: Vec<SweepConfiguration>,
    pub submitted_jobs: Vec<SubmittedJob>,
}

impl Sweep {
    pub fn submitted_count(&self) -> usize {
        self.submitted_jobs.iter().filter(|job| job.is_accepted()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.submitted_jobs.len() - self.submitted_count()
    }

    pub fn configuration(&self, id: ConfigId) -> Option<&SweepConfiguration> {
        self.configurations.iter().find(|config| config.id == id)
    }

    /// Jobs that reached the scheduler, in submission order.
    pub fn pollable_jobs(&self) -> impl Iterator<Item = &SubmittedJob> {
        self.submitted_jobs.iter().filter(|job| job.is_accepted())
    }

    pub fn summary(&self) -> SweepSummary {
        SweepSummary {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            configuration_count: self.configurations.len(),
            submitted_count: self.submitted_count(),
            failed_count: self.failed_count(),
        }
    }
}

/// Name given to a sweep when the caller does not supply one.
pub fn default_sweep_name(created_at: DateTime<Utc>) -> String {
    format!("HPL sweep {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// Listing entry for a stored sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub id: SweepId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub configuration_count: usize,
    pub submitted_count: usize,
    pub failed_count: usize,
}
