//! Ladruno - OpenSees job orchestration for SLURM.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ladruno_cli::{Args, Command, SizingArgs, submit_options};
use ladruno_archive::Manifest;
use ladruno_core::{AllocationPlan, PartitionScanner, discover_models, plan_allocation};
use ladruno_h5::{FlagClearer, RepairTool};
use ladruno_parsers::format_duration;
use ladruno_runner::{MultiRun, RunError};
use ladruno_slurm::{CompletionWaiter, JobId};
use miette::{IntoDiagnostic, Result, miette};
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    match &args.command {
        Command::Plan { dir, sizing, json } => plan(dir, sizing, *json),
        Command::Script {
            dir,
            sizing,
            script,
            archive,
        } => {
            let config = args.run_config(sizing, script, archive);
            let opts = submit_options(script, archive, true, true);
            let multi = MultiRun::discover(dir, &config).into_diagnostic()?;
            for run in multi.runs() {
                let path = run.write_script(&opts).into_diagnostic()?;
                println!("{}", path);
            }
            Ok(())
        }
        Command::Submit {
            dir,
            sizing,
            script,
            archive,
            no_rebuild,
            no_fix,
        } => {
            let config = args.run_config(sizing, script, archive);
            let opts = submit_options(script, archive, !no_rebuild, !no_fix);
            let multi = MultiRun::discover(dir, &config).into_diagnostic()?;

            let outcomes = multi.submit_all(&opts).await;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(submission) => match &submission.archived_to {
                        Some(dest) => {
                            println!("{}: job {} -> {}", outcome.path, submission.job_id, dest)
                        }
                        None => println!("{}: job {}", outcome.path, submission.job_id),
                    },
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", outcome.path, e);
                    }
                }
            }
            if args.verbose {
                println!(
                    "Submitted {} of {} model(s)",
                    outcomes.len() - failed,
                    outcomes.len()
                );
            }
            if failed > 0 {
                return Err(miette!("{} of {} submission(s) failed", failed, outcomes.len()));
            }
            Ok(())
        }
        Command::Wait {
            job_id,
            poll_interval,
        } => {
            let interval = Duration::from_secs(*poll_interval);
            let waiter = CompletionWaiter::new(args.squeue.clone(), interval);
            let waited = waiter.wait(JobId::new(*job_id)).await.into_diagnostic()?;
            println!("Job {} finished after {}", job_id, format_duration(waited));
            Ok(())
        }
        Command::Repair {
            dir,
            pattern,
            clearer,
        } => repair(dir, pattern, clearer.clearer(), args.verbose).await,
        Command::Archive {
            dir,
            job_id,
            archive,
            no_fix,
        } => {
            let settings = archive
                .settings()
                .ok_or(RunError::ArchiveNotConfigured)
                .into_diagnostic()?;
            let dest = settings
                .archiver(args.squeue.clone())
                .archive_after_finish(dir, JobId::new(*job_id), !no_fix)
                .await
                .into_diagnostic()?;
            println!("{} -> {}", dir, dest);
            Ok(())
        }
        Command::History { dest_root, job } => history(dest_root, *job),
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` selects info over warn.
fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "ladruno=info" } else { "ladruno=warn" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default).into_diagnostic()?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

#[derive(Serialize)]
struct PlanRow {
    path: Utf8PathBuf,
    required_tasks: u32,
    #[serde(flatten)]
    plan: AllocationPlan,
}

fn plan(dir: &Utf8Path, sizing: &SizingArgs, json: bool) -> Result<()> {
    let scanner = PartitionScanner::new(sizing.partition_pattern()).into_diagnostic()?;
    let capacity = sizing.capacity();

    let mut rows = Vec::new();
    for model in discover_models(dir, &sizing.entry_point).into_diagnostic()? {
        let required_tasks = scanner.required_tasks(model.path());
        let plan = plan_allocation(required_tasks, &capacity).into_diagnostic()?;
        rows.push(PlanRow {
            path: model.path().to_owned(),
            required_tasks,
            plan,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows).into_diagnostic()?);
        return Ok(());
    }
    for row in &rows {
        println!(
            "{}: tasks={} nodes={} tasks/node={}{}",
            row.path,
            row.required_tasks,
            row.plan.nodes,
            row.plan.tasks_per_node,
            if row.plan.capped { " (capped)" } else { "" }
        );
    }
    Ok(())
}

fn history(dest_root: &Utf8Path, job: Option<u64>) -> Result<()> {
    let manifest = Manifest::new(dest_root);
    let records = match job {
        Some(id) => manifest.records_for(JobId::new(id)),
        None => manifest.records(),
    }
    .into_diagnostic()?;

    if records.is_empty() {
        eprintln!("No moves recorded in {}", manifest.path());
    }
    for record in &records {
        println!(
            "{}  job {}  {} -> {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.job_id,
            record.source,
            record.destination
        );
    }
    Ok(())
}

async fn repair(dir: &Utf8Path, pattern: &str, clearer: FlagClearer, verbose: bool) -> Result<()> {
    let mut tool = RepairTool::new(dir, pattern)
        .into_diagnostic()?
        .with_clearer(clearer);
    let report = tool.run_full_check_and_fix().await;
    if verbose {
        println!("{}", report);
    }
    if !report.is_clean() {
        return Err(miette!(
            "{} file(s) in {} are still flagged open-for-write",
            report.flagged,
            dir
        ));
    }
    Ok(())
}
