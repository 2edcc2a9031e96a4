use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hs_engine::{DispatchRequest, EngineConfig, SweepEngine};
use hs_scheduler::{LocalShell, SlurmAdapter};
use hs_store::JsonFileStore;
use hs_sweep::GenerationRequest;
use hs_types::{HplTuning, ResourceSpec, StatusSnapshot, SweepId};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hpl-sweep", about = "Plan, submit and track HPL parameter sweeps on Slurm")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank P x Q process grids for a total number of MPI ranks.
    Advise {
        total: u64,
    },
    /// Expand a plan into configurations without submitting anything.
    Generate {
        plan: PathBuf,
    },
    /// Generate, submit and follow a sweep until every job settles.
    Run {
        plan: PathBuf,
        /// Return right after submission instead of polling.
        #[arg(long)]
        no_follow: bool,
    },
    /// Poll the scheduler once and print the sweep's status.
    Status {
        sweep_id: SweepId,
        /// Keep polling until every job settles.
        #[arg(long)]
        follow: bool,
    },
    /// List stored sweeps.
    List,
    /// Show the scheduler version and node count.
    Cluster,
    /// List the partitions jobs can be submitted to.
    Partitions,
    /// Submit a short hostname job to check a resource request.
    TestJob {
        #[arg(long)]
        nodes: u32,
        #[arg(long)]
        cpus_per_node: u32,
        #[arg(long)]
        partition: String,
    },
}

/// A sweep plan as written by the user.
#[derive(Debug, Deserialize)]
struct Plan {
    #[serde(default)]
    name: Option<String>,
    generation: GenerationRequest,
    resources: ResourceSpec,
    #[serde(default)]
    tuning: HplTuning,
}

impl Plan {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing plan {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let engine = build_engine(config)?;

    match cli.command {
        Command::Advise { total } => {
            for candidate in engine.advise_grid(total)? {
                println!("{}", candidate.description);
            }
        }
        Command::Generate { plan } => {
            let plan = Plan::load(&plan)?;
            let generated = engine.generate(&plan.generation)?;
            println!("{}", serde_json::to_string_pretty(&generated)?);
        }
        Command::Run { plan, no_follow } => {
            let plan = Plan::load(&plan)?;
            let generated = engine.generate(&plan.generation)?;
            if generated.truncated {
                warn!(
                    requested = generated.total_requested,
                    generated = generated.total_generated,
                    "plan exceeds the combination cap; submitting the first configurations only"
                );
            }

            let mut request = DispatchRequest::new(generated.configurations, plan.resources)
                .with_tuning(plan.tuning);
            request.name = plan.name;

            let response = engine.dispatch(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if response.submitted_count == 0 {
                bail!("the scheduler rejected every configuration");
            }
            if !no_follow {
                follow(&engine, response.sweep_id).await?;
            }
        }
        Command::Status { sweep_id, follow: keep_polling } => {
            if keep_polling {
                follow(&engine, sweep_id).await?;
            } else {
                print_snapshot(&engine.refresh(sweep_id).await?);
            }
        }
        Command::List => {
            for summary in engine.list_sweeps().await? {
                println!(
                    "{}  {}  {}  {} configs, {} submitted, {} failed",
                    summary.id,
                    summary.created_at.format("%Y-%m-%d %H:%M"),
                    summary.name,
                    summary.configuration_count,
                    summary.submitted_count,
                    summary.failed_count
                );
            }
        }
        Command::Cluster => {
            let info = engine.cluster_info().await?;
            println!(
                "scheduler: {}",
                info.scheduler_version.as_deref().unwrap_or("unknown")
            );
            match info.total_nodes {
                Some(nodes) => println!("nodes:     {nodes}"),
                None => println!("nodes:     unknown"),
            }
        }
        Command::Partitions => {
            for partition in engine.list_partitions().await? {
                println!("{partition}");
            }
        }
        Command::TestJob {
            nodes,
            cpus_per_node,
            partition,
        } => {
            let resources = ResourceSpec::new(nodes, cpus_per_node, partition);
            let report = engine.run_test_job(&resources).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed {
                bail!("test job {} did not complete ({})", report.job_id, report.job_state);
            }
        }
    }

    Ok(())
}

fn build_engine(config: EngineConfig) -> Result<SweepEngine> {
    let store = JsonFileStore::new(&config.store_dir)
        .with_context(|| format!("opening store at {}", config.store_dir.display()))?;
    let adapter = SlurmAdapter::new(LocalShell::new(), config.slurm());
    Ok(SweepEngine::new(config, Arc::new(adapter), Arc::new(store))?)
}

/// Refresh until every job settles or the user interrupts. Interrupting only
/// stops polling; the jobs keep running on the cluster.
async fn follow(engine: &SweepEngine, sweep_id: SweepId) -> Result<()> {
    let interval = engine.config().poll_interval();

    loop {
        let snapshot = engine.refresh(sweep_id).await?;
        print_snapshot(&snapshot);
        if snapshot.is_settled() {
            info!(sweep_id = %sweep_id, "every job has settled");
            return Ok(());
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(sweep_id = %sweep_id, "stopped polling; jobs continue on the cluster");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

fn print_snapshot(snapshot: &StatusSnapshot) {
    println!("snapshot at {}", snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (state, count) in &snapshot.status_counts {
        println!("  {:<10} {count}", state.as_str());
    }
    for job in &snapshot.jobs {
        let state = match (job.canonical_state(), job.error()) {
            (Some(state), _) => state.to_string(),
            (None, Some(error)) => format!("query failed: {error}"),
            (None, None) => String::new(),
        };
        let shape = &job.config;
        println!(
            "  #{:<4} job {:<10} N={:<7} NB={:<4} P={:<3} Q={:<3} {state}",
            job.config_id, job.external_job_id, shape.n, shape.nb, shape.p, shape.q
        );
    }
}
