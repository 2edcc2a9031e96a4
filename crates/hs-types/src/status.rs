//! Canonical job states and point-in-time status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::sweep::{ConfigId, ProblemShape};

/// Scheduler-independent job lifecycle state.
///
/// `Submitted -> Pending -> Running -> {Completed | Failed | Timeout | Cancelled}`.
/// `NotFound` and `Unknown` are observation states reachable from any
/// non-terminal state and are treated as terminal for polling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalState {
    Submitted,
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    NotFound,
    Unknown,
}

impl CanonicalState {
    pub const ALL: [CanonicalState; 9] = [
        Self::Submitted,
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Timeout,
        Self::NotFound,
        Self::Unknown,
    ];

    /// Translate a raw scheduler state through the closed state table.
    ///
    /// The raw value is trimmed, upper-cased and reduced to its first word
    /// with any trailing `+` removed, so `"CANCELLED by 1042"` and
    /// `"CANCELLED+"` both read as `CANCELLED`. Values outside the table map
    /// to [`CanonicalState::Unknown`]; this never fails.
    pub fn from_raw(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        let token = upper
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches('+');

        match token {
            "SUBMITTED" => Self::Submitted,
            "PENDING" | "PD" | "CONFIGURING" | "CF" | "REQUEUED" | "RQ" | "REQUEUE_HOLD"
            | "REQUEUE_FED" | "RESV_DEL_HOLD" => Self::Pending,
            "RUNNING" | "R" | "COMPLETING" | "CG" | "STAGE_OUT" | "SO" | "SIGNALING"
            | "RESIZING" => Self::Running,
            "COMPLETED" | "CD" => Self::Completed,
            "FAILED" | "F" | "NODE_FAIL" | "NF" | "BOOT_FAIL" | "BF" | "OUT_OF_MEMORY" | "OOM"
            | "PREEMPTED" | "PR" | "REVOKED" => Self::Failed,
            "CANCELLED" | "CA" => Self::Cancelled,
            "TIMEOUT" | "TO" | "DEADLINE" | "DL" => Self::Timeout,
            "NOT_FOUND" => Self::NotFound,
            _ => Self::Unknown,
        }
    }

    /// Whether a job observed in this state will not change any more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Failed
                | Self::Cancelled
                | Self::Timeout
                | Self::NotFound
                | Self::Unknown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::NotFound => "NOT_FOUND",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Display tone for presentation layers. `Unknown` (every unrecognized
    /// scheduler value) falls back to [`StatusTone::Muted`].
    pub fn tone(&self) -> StatusTone {
        match self {
            Self::Submitted => StatusTone::Neutral,
            Self::Pending => StatusTone::Waiting,
            Self::Running => StatusTone::Active,
            Self::Completed => StatusTone::Success,
            Self::Failed => StatusTone::Danger,
            Self::Timeout | Self::Cancelled => StatusTone::Warning,
            Self::NotFound | Self::Unknown => StatusTone::Muted,
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of display tones a UI maps to colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Neutral,
    Waiting,
    Active,
    Success,
    Danger,
    Warning,
    Muted,
}

/// What a poll learned about one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobObservation {
    Observed {
        canonical_state: CanonicalState,
        raw_state: String,
    },
    QueryFailed {
        error: String,
    },
}

/// Status of one submitted job at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusDetail {
    pub config_id: ConfigId,
    pub external_job_id: String,
    #[serde(flatten)]
    pub config: ProblemShape,
    #[serde(flatten)]
    pub observation: JobObservation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<String>,
}

impl JobStatusDetail {
    pub fn canonical_state(&self) -> Option<CanonicalState> {
        match &self.observation {
            JobObservation::Observed { canonical_state, .. } => Some(*canonical_state),
            JobObservation::QueryFailed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.observation {
            JobObservation::Observed { .. } => None,
            JobObservation::QueryFailed { error } => Some(error),
        }
    }
}

/// Point-in-time view over every polled job of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub taken_at: DateTime<Utc>,
    pub status_counts: BTreeMap<CanonicalState, usize>,
    pub jobs: Vec<JobStatusDetail>,
}

impl StatusSnapshot {
    /// Build a snapshot, tallying the canonical states of observed jobs.
    /// Jobs whose query failed are listed but not counted.
    pub fn from_jobs(taken_at: DateTime<Utc>, jobs: Vec<JobStatusDetail>) -> Self {
        let mut status_counts = BTreeMap::new();
        for state in jobs.iter().filter_map(JobStatusDetail::canonical_state) {
            *status_counts.entry(state).or_insert(0) += 1;
        }
        Self {
            taken_at,
            status_counts,
            jobs,
        }
    }

    pub fn count(&self, state: CanonicalState) -> usize {
        self.status_counts.get(&state).copied().unwrap_or(0)
    }

    pub fn error_count(&self) -> usize {
        self.jobs.iter().filter(|job| job.error().is_some()).count()
    }

    /// True once every listed job has been observed in a terminal state.
    pub fn is_settled(&self) -> bool {
        self.jobs
            .iter()
            .all(|job| job.canonical_state().is_some_and(|state| state.is_terminal()))
    }

    /// Equality ignoring `taken_at`.
    pub fn same_observations(&self, other: &StatusSnapshot) -> bool {
        self.status_counts == other.status_counts && self.jobs == other.jobs
    }
}
