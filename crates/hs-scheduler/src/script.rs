//! Rendering of HPL.dat input files and Slurm batch scripts.

use hs_types::{HplTuning, ProblemShape, ResourceSpec};

use crate::adapter::SubmissionRequest;
use crate::shell::shell_quote;

/// Job name used for one configuration of a sweep.
pub fn job_name(request: &SubmissionRequest) -> String {
    let sweep = request.sweep_id.simple().to_string();
    format!("hpl_{}_{}", &sweep[..8], request.configuration.id)
}

/// HPL.dat for a single problem, one value per parameter list.
pub fn render_hpl_dat(shape: &ProblemShape, tuning: &HplTuning) -> String {
    let lines = [
        "HPLinpack benchmark input file".to_string(),
        "Innovative Computing Laboratory, University of Tennessee".to_string(),
        field("HPL.out", "output file name (if any)"),
        field(6, "device out (6=stdout,7=stderr,file)"),
        field(1, "# of problems sizes (N)"),
        field(shape.n, "Ns"),
        field(1, "# of NBs"),
        field(shape.nb, "NBs"),
        field(0, "PMAP process mapping (0=Row-,1=Column-major)"),
        field(1, "# of process grids (P x Q)"),
        field(shape.p, "Ps"),
        field(shape.q, "Qs"),
        field("16.0", "threshold"),
        field(1, "# of panel fact"),
        field(tuning.pfact, "PFACTs (0=left, 1=Crout, 2=Right)"),
        field(1, "# of recursive stopping criterium"),
        field(tuning.nbmin, "NBMINs (>= 1)"),
        field(1, "# of panels in recursion"),
        field(tuning.ndiv, "NDIVs"),
        field(1, "# of recursive panel fact."),
        field(tuning.rfact, "RFACTs (0=left, 1=Crout, 2=Right)"),
        field(1, "# of broadcast"),
        field(tuning.bcast, "BCASTs (0=1rg,1=1rM,2=2rg,3=2rM,4=Lng,5=LnM)"),
        field(1, "# of lookahead depth"),
        field(tuning.depth, "DEPTHs (>=0)"),
        field(tuning.swap, "SWAP (0=bin-exch,1=long,2=mix)"),
        field(tuning.swap_threshold, "swapping threshold"),
        field(tuning.l1, "L1 in (0=transposed,1=no-transposed) form"),
        field(tuning.u, "U  in (0=transposed,1=no-transposed) form"),
        field(tuning.equil, "Equilibration (0=no,1=yes)"),
        field(tuning.align, "memory alignment in double (> 0)"),
    ];
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn field(value: impl std::fmt::Display, label: &str) -> String {
    format!("{:<13}{label}", value.to_string())
}

/// Batch script that runs one configuration from its staging directory.
///
/// `sbatch` is called from `job_dir`, so the output file is given relative
/// to it.
pub fn render_batch_script(request: &SubmissionRequest, job_dir: &str, launcher: &str) -> String {
    let resources = &request.resources;
    let config = &request.configuration;
    let total = resources.total_processes();

    format!(
        r#"#!/bin/bash
#SBATCH --job-name={name}
#SBATCH --nodes={nodes}
#SBATCH --ntasks-per-node={cpus}
#SBATCH --partition={partition}
#SBATCH --time={time}
#SBATCH --output=hpl_output_%j.out

# Sweep {sweep_id}, configuration {config_id}
# N={n}, NB={nb}, P={p}, Q={q}

cd {quoted_dir} || exit 1
echo "HPL job $SLURM_JOB_ID on $(hostname) at $(date)"
{launcher} -np {total} {executable}
echo "HPL job finished at $(date)"
"#,
        name = job_name(request),
        nodes = resources.nodes,
        cpus = resources.cpus_per_node,
        partition = resources.partition,
        time = resources.time_limit,
        sweep_id = request.sweep_id,
        config_id = config.id,
        n = config.n,
        nb = config.nb,
        p = config.p,
        q = config.q,
        executable = resources.executable_path,
        quoted_dir = shell_quote(job_dir),
    )
}

/// Name of the staged test script inside its directory.
pub const TEST_SCRIPT_NAME: &str = "hpl_test_job.sh";

/// Lines the test script prints once `srun` has reached every node.
pub const TEST_HOSTS_MARKER: &str = "Running hostname on all nodes:";
pub const TEST_DONE_MARKER: &str = "=== Test Complete ===";

/// Output file a test job writes, relative to the directory it was
/// submitted from.
pub fn test_output_name(job_id: &str) -> String {
    format!("hpl_test_{job_id}.out")
}

/// Two-minute batch script that runs `hostname` on every allocated node.
pub fn render_test_script(resources: &ResourceSpec) -> String {
    format!(
        r#"#!/bin/bash
#SBATCH --job-name=hpl_test
#SBATCH --nodes={nodes}
#SBATCH --ntasks-per-node={cpus}
#SBATCH --partition={partition}
#SBATCH --time=00:02:00
#SBATCH --output=hpl_test_%j.out

echo "=== HPL Sweep test job ==="
echo "Hostname: $(hostname)"
echo "Date: $(date)"
echo "Nodes allocated: $SLURM_JOB_NUM_NODES"
echo "Tasks per node: {cpus}"
echo "Partition: {partition}"
echo ""
echo "{TEST_HOSTS_MARKER}"
srun hostname
echo ""
echo "{TEST_DONE_MARKER}"
"#,
        nodes = resources.nodes,
        cpus = resources.cpus_per_node,
        partition = resources.partition,
    )
}

/// Whether captured test job output shows the script ran to the end.
pub fn test_output_passed(output: &str) -> bool {
    output.contains(TEST_HOSTS_MARKER) && output.contains(TEST_DONE_MARKER)
}
