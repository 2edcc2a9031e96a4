//! Slurm implementation of [`SchedulerAdapter`] driven over a [`RemoteShell`].
//!
//! Every configuration is staged into its own directory (`HPL.dat` plus the
//! batch script) before `sbatch` is called, so concurrent submissions never
//! share an input file.

use async_trait::async_trait;
use hs_types::{CanonicalState, ResourceSpec, SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::{ClusterInfo, RawJobStatus, SchedulerAdapter, SubmissionRequest, TestJobReport};
use crate::script::{
    render_batch_script, render_hpl_dat, render_test_script, test_output_name, test_output_passed,
    TEST_SCRIPT_NAME,
};
use crate::shell::{shell_quote, CommandOutput, RemoteShell};

/// Delay between status checks while waiting on a test job.
const TEST_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Where and how jobs are staged on the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlurmConfig {
    /// Remote directory under which per-configuration job directories are created.
    pub work_dir: String,
    /// MPI launcher prefix placed before `-np <ranks> <executable>`.
    pub launcher: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            work_dir: "/tmp/hpl-sweep".to_string(),
            launcher: "mpirun".to_string(),
        }
    }
}

/// Submits and tracks HPL jobs through `sbatch`, `squeue` and `sacct`.
#[derive(Debug)]
pub struct SlurmAdapter<S: RemoteShell> {
    shell: S,
    config: SlurmConfig,
}

impl<S: RemoteShell> SlurmAdapter<S> {
    pub fn new(shell: S, config: SlurmConfig) -> Self {
        Self { shell, config }
    }

    pub fn config(&self) -> &SlurmConfig {
        &self.config
    }

    fn job_dir(&self, request: &SubmissionRequest) -> String {
        format!(
            "{}/{}/config_{}",
            self.config.work_dir.trim_end_matches('/'),
            request.sweep_id.simple(),
            request.configuration.id
        )
    }

    /// Run a command; transport failures mean the scheduler is unreachable.
    async fn run(&self, command: &str) -> SchedulerResult<CommandOutput> {
        self.shell
            .execute(command)
            .await
            .map_err(|e| SchedulerError::Unavailable {
                message: e.to_string(),
            })
    }

    async fn stage_file(&self, path: &str, content: &str) -> SchedulerResult<()> {
        let command = format!(
            "cat > {} << '{HEREDOC_MARKER}'\n{content}{HEREDOC_MARKER}\n",
            shell_quote(path)
        );
        let output = self.run(&command).await?;
        if output.success() {
            Ok(())
        } else {
            Err(SchedulerError::Rejected {
                reason: format!("failed to stage {path}: {}", output.failure_text()),
            })
        }
    }

    fn test_dir(&self) -> String {
        format!("{}/test_jobs", self.config.work_dir.trim_end_matches('/'))
    }

    async fn submit_test_script(&self, resources: &ResourceSpec) -> SchedulerResult<String> {
        let dir = self.test_dir();
        let quoted_dir = shell_quote(&dir);

        let mkdir = self.run(&format!("mkdir -p {quoted_dir}")).await?;
        if !mkdir.success() {
            return Err(SchedulerError::Rejected {
                reason: format!("failed to create {dir}: {}", mkdir.failure_text()),
            });
        }
        self.stage_file(&format!("{dir}/{TEST_SCRIPT_NAME}"), &render_test_script(resources))
            .await?;

        let output = self
            .run(&format!("cd {quoted_dir} && sbatch {TEST_SCRIPT_NAME}"))
            .await?;
        if !output.success() {
            return Err(SchedulerError::Rejected {
                reason: output.failure_text(),
            });
        }
        parse_sbatch_output(&output.stdout).ok_or_else(|| SchedulerError::Rejected {
            reason: format!("could not parse job id from: {}", output.stdout.trim()),
        })
    }

    /// Poll until the job reaches a terminal state, leaves the scheduler's
    /// view, or `wait` runs out. Returns the last raw state seen.
    async fn wait_for_test_job(&self, job_id: &str, wait: Duration) -> SchedulerResult<String> {
        let deadline = Instant::now() + wait;
        let mut job_state = CanonicalState::Unknown.as_str().to_string();

        loop {
            match self.query(job_id).await {
                Ok(status) => {
                    let settled = CanonicalState::from_raw(&status.state).is_terminal();
                    job_state = status.state;
                    if settled {
                        break;
                    }
                }
                Err(SchedulerError::JobNotFound { .. }) => break,
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => {
                    warn!(job_id, error = %err, "could not check test job");
                    break;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(job_id, state = %job_state, "stopped waiting on test job");
                break;
            }
            tokio::time::sleep(TEST_POLL_INTERVAL.min(remaining)).await;
        }

        Ok(job_state)
    }
}

const HEREDOC_MARKER: &str = "EOF_HPL_SWEEP";

#[async_trait]
impl<S: RemoteShell> SchedulerAdapter for SlurmAdapter<S> {
    async fn check_available(&self) -> SchedulerResult<()> {
        let output = self.run("sinfo --version").await?;
        if output.success() {
            debug!(version = %output.stdout.trim(), "slurm reachable");
            Ok(())
        } else {
            Err(SchedulerError::Unavailable {
                message: output.failure_text(),
            })
        }
    }

    async fn submit(&self, request: &SubmissionRequest) -> SchedulerResult<String> {
        let job_dir = self.job_dir(request);
        let quoted_dir = shell_quote(&job_dir);

        let mkdir = self.run(&format!("mkdir -p {quoted_dir}")).await?;
        if !mkdir.success() {
            return Err(SchedulerError::Rejected {
                reason: format!("failed to create {job_dir}: {}", mkdir.failure_text()),
            });
        }

        let hpl_dat = render_hpl_dat(&request.configuration.shape(), &request.tuning);
        self.stage_file(&format!("{job_dir}/HPL.dat"), &hpl_dat)
            .await?;

        let script = render_batch_script(request, &job_dir, &self.config.launcher);
        self.stage_file(&format!("{job_dir}/job.sh"), &script)
            .await?;

        let output = self
            .run(&format!("cd {quoted_dir} && sbatch job.sh"))
            .await?;
        if !output.success() {
            warn!(
                config_id = request.configuration.id,
                error = %output.failure_text(),
                "sbatch rejected job"
            );
            return Err(SchedulerError::Rejected {
                reason: output.failure_text(),
            });
        }

        let job_id = parse_sbatch_output(&output.stdout).ok_or_else(|| {
            SchedulerError::Rejected {
                reason: format!("could not parse job id from: {}", output.stdout.trim()),
            }
        })?;

        info!(
            sweep_id = %request.sweep_id,
            config_id = request.configuration.id,
            job_id = %job_id,
            "submitted HPL job"
        );
        Ok(job_id)
    }

    async fn query(&self, external_job_id: &str) -> SchedulerResult<RawJobStatus> {
        if !is_job_id(external_job_id) {
            return Err(SchedulerError::QueryFailed {
                message: format!("malformed job id {external_job_id:?}"),
            });
        }

        // Live queue first; finished jobs only show up in accounting.
        let queued = self
            .run(&format!(
                "squeue -j {external_job_id} -h -o '%T|%r|%M|%L'"
            ))
            .await?;
        if queued.success() {
            if let Some(status) = parse_squeue_output(&queued.stdout) {
                return Ok(status);
            }
        }

        let accounted = self
            .run(&format!(
                "sacct -j {external_job_id} -n -X -o State,ExitCode,Elapsed --parsable2"
            ))
            .await?;
        if !accounted.success() {
            return Err(SchedulerError::QueryFailed {
                message: accounted.failure_text(),
            });
        }

        parse_sacct_output(&accounted.stdout).ok_or_else(|| SchedulerError::JobNotFound {
            job_id: external_job_id.to_string(),
        })
    }

    /// Partitions visible to the submitting user, default marker removed.
    async fn list_partitions(&self) -> SchedulerResult<Vec<String>> {
        let output = self.run("sinfo -h -o '%P'").await?;
        if !output.success() {
            return Err(SchedulerError::QueryFailed {
                message: output.failure_text(),
            });
        }
        Ok(parse_partitions(&output.stdout))
    }

    /// Slurm version and node total. Either half is left empty when its
    /// `sinfo` call fails.
    async fn cluster_info(&self) -> SchedulerResult<ClusterInfo> {
        let version = self.run("sinfo --version").await?;
        let nodes = self.run("sinfo -h -o '%D'").await?;

        Ok(ClusterInfo {
            scheduler_version: version
                .success()
                .then(|| version.stdout.trim().to_string())
                .filter(|v| !v.is_empty()),
            total_nodes: nodes
                .success()
                .then(|| parse_node_total(&nodes.stdout))
                .flatten(),
        })
    }

    async fn run_test_job(
        &self,
        resources: &ResourceSpec,
        wait: Duration,
    ) -> SchedulerResult<TestJobReport> {
        let job_id = self.submit_test_script(resources).await?;
        info!(job_id = %job_id, partition = %resources.partition, "submitted test job");

        let job_state = self.wait_for_test_job(&job_id, wait).await?;

        let dir = self.test_dir();
        let output_path = format!("{dir}/{}", test_output_name(&job_id));
        let captured = self
            .run(&format!("cat {}", shell_quote(&output_path)))
            .await?;
        let output = captured.success().then_some(captured.stdout);

        let cleanup = self
            .run(&format!(
                "rm -f {} {}",
                shell_quote(&format!("{dir}/{TEST_SCRIPT_NAME}")),
                shell_quote(&output_path)
            ))
            .await?;
        if !cleanup.success() {
            warn!(job_id = %job_id, error = %cleanup.failure_text(), "test job cleanup failed");
        }

        Ok(TestJobReport {
            passed: output.as_deref().is_some_and(test_output_passed),
            job_id,
            job_state,
            output,
            nodes: resources.nodes,
            cpus_per_node: resources.cpus_per_node,
            partition: resources.partition.clone(),
        })
    }

    fn name(&self) -> &str {
        "slurm"
    }
}

fn is_job_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit() || c == '_')
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "None")
        .map(str::to_string)
}

/// Job id from `sbatch` output, either the classic
/// `Submitted batch job <id>` line or `--parsable` form `<id>[;cluster]`.
pub fn parse_sbatch_output(stdout: &str) -> Option<String> {
    stdout.lines().map(str::trim).find_map(|line| {
        let candidate = match line.strip_prefix("Submitted batch job ") {
            Some(rest) => rest.split_whitespace().next().unwrap_or(""),
            None => line.split(';').next().unwrap_or(""),
        };
        is_job_id(candidate).then(|| candidate.to_string())
    })
}

/// First row of `squeue -o '%T|%r|%M|%L'`.
pub fn parse_squeue_output(stdout: &str) -> Option<RawJobStatus> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.split('|');
    let state = parts.next()?.trim();
    if state.is_empty() {
        return None;
    }
    Some(RawJobStatus {
        state: state.to_string(),
        reason: non_empty(parts.next()),
        time_used: non_empty(parts.next()),
        time_left: non_empty(parts.next()),
        exit_code: None,
        in_queue: true,
    })
}

/// First allocation row of `sacct -X -o State,ExitCode,Elapsed --parsable2`.
pub fn parse_sacct_output(stdout: &str) -> Option<RawJobStatus> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.split('|');
    let state = parts.next()?.trim();
    if state.is_empty() {
        return None;
    }
    Some(RawJobStatus {
        state: state.to_string(),
        reason: None,
        exit_code: non_empty(parts.next()),
        time_used: non_empty(parts.next()),
        time_left: None,
        in_queue: false,
    })
}

/// Sum of the per-row node counts from `sinfo -h -o '%D'`. `None` if any
/// row is not a number.
pub fn parse_node_total(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .try_fold(0u64, |total, line| total.checked_add(line.parse().ok()?))
}

/// Partition names from `sinfo -h -o '%P'`, sorted and de-duplicated.
pub fn parse_partitions(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_end_matches('*'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellError;
    use hs_types::{HplTuning, ProblemShape, ResourceSpec, SweepConfiguration};
    use parking_lot::Mutex;
    use uuid::Uuid;

    /// Replies to commands by prefix and records everything it was asked to run.
    #[derive(Default)]
    struct ScriptedShell {
        replies: Vec<(&'static str, CommandOutput)>,
        commands: Mutex<Vec<String>>,
        disconnected: bool,
    }

    impl ScriptedShell {
        fn reply(mut self, prefix: &'static str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
            self.replies.push((
                prefix,
                CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code,
                },
            ));
            self
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn execute(&self, command: &str) -> Result<CommandOutput, ShellError> {
            self.commands.lock().push(command.to_string());
            if self.disconnected {
                return Err(ShellError::NotConnected);
            }
            Ok(self
                .replies
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix))
                .map(|(_, output)| output.clone())
                .unwrap_or_default())
        }
    }

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            sweep_id: Uuid::new_v4(),
            configuration: SweepConfiguration::new(
                3,
                ProblemShape {
                    n: 10000,
                    nb: 128,
                    p: 2,
                    q: 2,
                },
            ),
            resources: ResourceSpec::new(1, 4, "debug"),
            tuning: HplTuning::default(),
        }
    }

    fn adapter(shell: ScriptedShell) -> SlurmAdapter<ScriptedShell> {
        SlurmAdapter::new(shell, SlurmConfig::default())
    }

    #[test]
    fn sbatch_output_formats() {
        assert_eq!(
            parse_sbatch_output("Submitted batch job 123456\n"),
            Some("123456".to_string())
        );
        assert_eq!(parse_sbatch_output("98765;cluster-a\n"), Some("98765".to_string()));
        assert_eq!(
            parse_sbatch_output("sbatch: warning: defaulting\nSubmitted batch job 42\n"),
            Some("42".to_string())
        );
        assert_eq!(parse_sbatch_output("something went sideways"), None);
        assert_eq!(parse_sbatch_output(""), None);
    }

    #[test]
    fn squeue_row_parsing() {
        let status = parse_squeue_output("PENDING|Priority|0:00|1:00:00\n").unwrap();
        assert_eq!(status.state, "PENDING");
        assert_eq!(status.reason.as_deref(), Some("Priority"));
        assert_eq!(status.time_used.as_deref(), Some("0:00"));
        assert_eq!(status.time_left.as_deref(), Some("1:00:00"));
        assert!(status.in_queue);

        let running = parse_squeue_output("RUNNING|None|12:04|47:56").unwrap();
        assert_eq!(running.reason, None);
        assert!(parse_squeue_output("\n").is_none());
    }

    #[test]
    fn sacct_row_parsing() {
        let status = parse_sacct_output("COMPLETED|0:0|00:12:31\n").unwrap();
        assert_eq!(status.state, "COMPLETED");
        assert_eq!(status.exit_code.as_deref(), Some("0:0"));
        assert_eq!(status.time_used.as_deref(), Some("00:12:31"));
        assert!(!status.in_queue);

        let cancelled = parse_sacct_output("CANCELLED by 1042|0:15|00:00:03").unwrap();
        assert_eq!(cancelled.state, "CANCELLED by 1042");
        assert!(parse_sacct_output("").is_none());
    }

    #[test]
    fn node_total_sums_partition_rows() {
        assert_eq!(parse_node_total("4\n12\n\n"), Some(16));
        assert_eq!(parse_node_total(""), Some(0));
        assert_eq!(parse_node_total("4\nn/a\n"), None);
    }

    #[test]
    fn partition_listing_strips_default_marker() {
        assert_eq!(
            parse_partitions("compute*\ndebug\ngpu\ndebug\n\n"),
            vec!["compute", "debug", "gpu"]
        );
    }

    #[tokio::test]
    async fn submit_stages_inputs_then_calls_sbatch() {
        let slurm = adapter(ScriptedShell::default().reply(
            "cd ",
            0,
            "Submitted batch job 5150\n",
            "",
        ));
        let req = request();

        let job_id = slurm.submit(&req).await.unwrap();
        assert_eq!(job_id, "5150");

        let commands = slurm.shell.commands();
        assert_eq!(commands.len(), 4);
        let dir = format!("/tmp/hpl-sweep/{}/config_3", req.sweep_id.simple());
        assert_eq!(commands[0], format!("mkdir -p '{dir}'"));
        assert!(commands[1].starts_with(&format!("cat > '{dir}/HPL.dat' << 'EOF_HPL_SWEEP'\n")));
        assert!(commands[1].contains("10000"));
        assert!(commands[1].ends_with("EOF_HPL_SWEEP\n"));
        assert!(commands[2].starts_with(&format!("cat > '{dir}/job.sh'")));
        assert!(commands[2].contains("mpirun -np 4 xhpl"));
        assert_eq!(commands[3], format!("cd '{dir}' && sbatch job.sh"));
    }

    #[tokio::test]
    async fn sbatch_failure_is_a_rejection() {
        let slurm = adapter(ScriptedShell::default().reply(
            "cd ",
            1,
            "",
            "sbatch: error: invalid partition specified: nope\n",
        ));

        match slurm.submit(&request()).await {
            Err(SchedulerError::Rejected { reason }) => {
                assert_eq!(reason, "sbatch: error: invalid partition specified: nope")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn staging_failure_stops_before_sbatch() {
        let slurm = adapter(ScriptedShell::default().reply("mkdir", 1, "", "Permission denied"));

        assert!(matches!(
            slurm.submit(&request()).await,
            Err(SchedulerError::Rejected { .. })
        ));
        assert_eq!(slurm.shell.commands().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_sbatch_output_is_a_rejection() {
        let slurm = adapter(ScriptedShell::default().reply("cd ", 0, "queued somewhere\n", ""));
        match slurm.submit(&request()).await {
            Err(SchedulerError::Rejected { reason }) => {
                assert!(reason.contains("queued somewhere"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_loss_is_unavailable() {
        let slurm = adapter(ScriptedShell {
            disconnected: true,
            ..ScriptedShell::default()
        });
        assert!(matches!(
            slurm.submit(&request()).await,
            Err(SchedulerError::Unavailable { .. })
        ));
        assert!(matches!(
            slurm.check_available().await,
            Err(SchedulerError::Unavailable { .. })
        ));
        assert!(matches!(
            slurm.query("12").await,
            Err(SchedulerError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn query_prefers_live_queue() {
        let slurm = adapter(ScriptedShell::default().reply(
            "squeue",
            0,
            "RUNNING|None|0:42|59:18\n",
            "",
        ));
        let status = slurm.query("777").await.unwrap();
        assert_eq!(status.state, "RUNNING");
        assert_eq!(slurm.shell.commands().len(), 1);
    }

    #[tokio::test]
    async fn query_falls_back_to_accounting() {
        let slurm = adapter(
            ScriptedShell::default()
                .reply("squeue", 1, "", "slurm_load_jobs error: Invalid job id specified")
                .reply("sacct", 0, "TIMEOUT|0:0|01:00:07\n", ""),
        );
        let status = slurm.query("777").await.unwrap();
        assert_eq!(status.state, "TIMEOUT");
        assert_eq!(status.time_used.as_deref(), Some("01:00:07"));
        assert!(!status.in_queue);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let slurm = adapter(ScriptedShell::default());
        match slurm.query("31337").await {
            Err(SchedulerError::JobNotFound { job_id }) => assert_eq!(job_id, "31337"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn accounting_failure_is_a_query_error() {
        let slurm = adapter(ScriptedShell::default().reply(
            "sacct",
            1,
            "",
            "sacct: error: slurmdbd: connection refused",
        ));
        assert!(matches!(
            slurm.query("12").await,
            Err(SchedulerError::QueryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_job_ids_never_reach_the_shell() {
        let slurm = adapter(ScriptedShell::default());
        assert!(matches!(
            slurm.query("12; rm -rf ~").await,
            Err(SchedulerError::QueryFailed { .. })
        ));
        assert!(slurm.shell.commands().is_empty());
    }

    #[tokio::test]
    async fn partitions_via_sinfo() {
        let slurm = adapter(ScriptedShell::default().reply(
            "sinfo -h",
            0,
            "batch*\nlong\n",
            "",
        ));
        assert_eq!(slurm.list_partitions().await.unwrap(), vec!["batch", "long"]);
    }

    #[tokio::test]
    async fn partitions_and_cluster_info_come_from_sinfo() {
        let slurm = adapter(
            ScriptedShell::default()
                .reply("sinfo -h -o '%P'", 0, "compute*\ndebug\n", "")
                .reply("sinfo --version", 0, "slurm 23.02.6\n", "")
                .reply("sinfo -h -o '%D'", 0, "4\n12\n", ""),
        );

        assert_eq!(slurm.list_partitions().await.unwrap(), vec!["compute", "debug"]);
        assert_eq!(
            slurm.cluster_info().await.unwrap(),
            ClusterInfo {
                scheduler_version: Some("slurm 23.02.6".to_string()),
                total_nodes: Some(16),
            }
        );
    }

    #[tokio::test]
    async fn cluster_info_tolerates_failed_sinfo() {
        let slurm = adapter(
            ScriptedShell::default()
                .reply("sinfo --version", 1, "", "command not found")
                .reply("sinfo -h -o '%D'", 0, "lots\n", ""),
        );
        assert_eq!(slurm.cluster_info().await.unwrap(), ClusterInfo::default());

        let offline = adapter(ScriptedShell {
            disconnected: true,
            ..ScriptedShell::default()
        });
        assert!(matches!(
            offline.cluster_info().await,
            Err(SchedulerError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_job_reports_output_and_cleans_up() {
        let slurm = adapter(
            ScriptedShell::default()
                .reply("cd ", 0, "Submitted batch job 88\n", "")
                .reply("squeue", 1, "", "slurm_load_jobs error: Invalid job id specified")
                .reply("sacct", 0, "COMPLETED|0:0|00:00:04\n", "")
                .reply(
                    "cat '",
                    0,
                    "Running hostname on all nodes:\nn01\n\n=== Test Complete ===\n",
                    "",
                ),
        );

        let report = slurm
            .run_test_job(&ResourceSpec::new(1, 4, "debug"), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(report.job_id, "88");
        assert_eq!(report.job_state, "COMPLETED");
        assert!(report.passed);
        assert_eq!((report.nodes, report.cpus_per_node), (1, 4));
        assert_eq!(report.partition, "debug");

        let commands = slurm.shell.commands();
        assert_eq!(commands[0], "mkdir -p '/tmp/hpl-sweep/test_jobs'");
        assert!(commands[1].starts_with("cat > '/tmp/hpl-sweep/test_jobs/hpl_test_job.sh'"));
        assert!(commands[1].contains("#SBATCH --partition=debug\n"));
        assert_eq!(commands[2], "cd '/tmp/hpl-sweep/test_jobs' && sbatch hpl_test_job.sh");
        assert!(commands.contains(&"cat '/tmp/hpl-sweep/test_jobs/hpl_test_88.out'".to_string()));
        assert_eq!(
            commands.last().map(String::as_str),
            Some("rm -f '/tmp/hpl-sweep/test_jobs/hpl_test_job.sh' '/tmp/hpl-sweep/test_jobs/hpl_test_88.out'")
        );
    }

    #[tokio::test]
    async fn test_job_still_queued_when_wait_runs_out() {
        let slurm = adapter(
            ScriptedShell::default()
                .reply("cd ", 0, "Submitted batch job 89\n", "")
                .reply("squeue", 0, "PENDING|Resources|0:00|2:00\n", "")
                .reply("cat '", 1, "", "No such file or directory"),
        );

        let report = slurm
            .run_test_job(&ResourceSpec::new(4, 64, "compute"), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(report.job_state, "PENDING");
        assert_eq!(report.output, None);
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn rejected_test_job_is_reported() {
        let slurm = adapter(ScriptedShell::default().reply(
            "cd ",
            1,
            "",
            "sbatch: error: invalid partition specified: nope",
        ));

        match slurm
            .run_test_job(&ResourceSpec::new(1, 4, "nope"), Duration::ZERO)
            .await
        {
            Err(SchedulerError::Rejected { reason }) => assert!(reason.contains("invalid partition")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
