//! # hs-scheduler
//!
//! The scheduler capability consumed by the sweep engine, plus a Slurm
//! implementation driven over any command transport.
//!
//! The engine only ever sees [`SchedulerAdapter`]; how a submission becomes a
//! batch script, and how commands reach the cluster, stay behind it.

pub mod adapter;
pub mod script;
pub mod shell;
pub mod slurm;

pub use adapter::{ClusterInfo, RawJobStatus, SchedulerAdapter, SubmissionRequest, TestJobReport};
pub use shell::{CommandOutput, LocalShell, RemoteShell, ShellError};
pub use slurm::{SlurmAdapter, SlurmConfig};
