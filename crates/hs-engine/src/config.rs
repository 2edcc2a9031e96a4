//! Engine configuration.

use hs_scheduler::SlurmConfig;
use hs_sweep::DEFAULT_COMBINATION_CAP;
use hs_types::{config_error, HsResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by every environment variable the engine reads.
pub const ENV_PREFIX: &str = "HPL_SWEEP_";

/// Tunables for the sweep engine and the binary built on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on configurations per generated or dispatched sweep.
    pub combination_cap: usize,
    /// Scheduler submissions in flight at once during a dispatch. The larger
    /// of the two limits also caps calls across concurrent operations.
    pub max_parallel_submissions: usize,
    /// Scheduler queries in flight at once during a refresh.
    pub max_parallel_queries: usize,
    /// Delay between refreshes when following a sweep.
    pub poll_interval_secs: u64,
    /// How long a test job is waited on before its report is taken.
    pub test_job_wait_secs: u64,
    /// Root of the JSON file store.
    pub store_dir: PathBuf,
    /// Remote staging directory for job inputs.
    pub work_dir: String,
    /// MPI launcher placed in front of the HPL executable.
    pub launcher: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            combination_cap: DEFAULT_COMBINATION_CAP,
            max_parallel_submissions: 4,
            max_parallel_queries: 4,
            poll_interval_secs: 10,
            test_job_wait_secs: 60,
            store_dir: PathBuf::from("./hpl-sweep-data"),
            work_dir: "/tmp/hpl-sweep".to_string(),
            launcher: "mpirun".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `HPL_SWEEP_*` variables set in the process
    /// environment.
    pub fn from_env() -> HsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> HsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(value) = var("COMBINATION_CAP") {
            config.combination_cap = parse_var("COMBINATION_CAP", &value)?;
        }
        if let Some(value) = var("MAX_PARALLEL_SUBMISSIONS") {
            config.max_parallel_submissions = parse_var("MAX_PARALLEL_SUBMISSIONS", &value)?;
        }
        if let Some(value) = var("MAX_PARALLEL_QUERIES") {
            config.max_parallel_queries = parse_var("MAX_PARALLEL_QUERIES", &value)?;
        }
        if let Some(value) = var("POLL_INTERVAL_SECS") {
            config.poll_interval_secs = parse_var("POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = var("TEST_JOB_WAIT_SECS") {
            config.test_job_wait_secs = parse_var("TEST_JOB_WAIT_SECS", &value)?;
        }
        if let Some(value) = var("STORE_DIR") {
            config.store_dir = PathBuf::from(value);
        }
        if let Some(value) = var("WORK_DIR") {
            config.work_dir = value;
        }
        if let Some(value) = var("LAUNCHER") {
            config.launcher = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HsResult<()> {
        if self.combination_cap == 0 {
            return Err(config_error!("combination_cap must be at least 1"));
        }
        if self.max_parallel_submissions == 0 {
            return Err(config_error!("max_parallel_submissions must be at least 1"));
        }
        if self.max_parallel_queries == 0 {
            return Err(config_error!("max_parallel_queries must be at least 1"));
        }
        if self.poll_interval_secs == 0 {
            return Err(config_error!("poll_interval_secs must be at least 1"));
        }
        if self.work_dir.trim().is_empty() {
            return Err(config_error!("work_dir must not be empty"));
        }
        if self.launcher.trim().is_empty() {
            return Err(config_error!("launcher must not be empty"));
        }
        Ok(())
    }

    /// Calls allowed into the scheduler session at once, summed over every
    /// dispatch and refresh running on the same engine.
    pub fn max_session_calls(&self) -> usize {
        self.max_parallel_submissions.max(self.max_parallel_queries)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn test_job_wait(&self) -> Duration {
        Duration::from_secs(self.test_job_wait_secs)
    }

    /// Adapter settings derived from this configuration.
    pub fn slurm(&self) -> SlurmConfig {
        SlurmConfig {
            work_dir: self.work_dir.clone(),
            launcher: self.launcher.clone(),
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> HsResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| config_error!("{ENV_PREFIX}{name}={value:?} is invalid: {e}"))
}
