//! Query the SLURM queue and wait for jobs to leave it.

use crate::types::JobId;
use ladruno_parsers::{CommandError, format_duration, run_command};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Default interval between queue queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Shorter intervals are raised to this so the queue is never polled in a
/// tight loop.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum SqueueError {
    #[error("Failed to query queue for job {job_id}: {source}")]
    Query {
        job_id: JobId,
        #[source]
        source: CommandError,
    },
}

/// Return whether `job_id` still appears in the queue.
///
/// `squeue -h -j <id>` prints nothing once the job has left the queue.
/// A non-zero exit is an infrastructure fault, never "job absent".
pub async fn job_in_queue(program: &str, job_id: JobId) -> Result<bool, SqueueError> {
    let mut cmd = Command::new(program);
    cmd.args(["-h", "-j", &job_id.to_string()]);

    let stdout = run_command(&mut cmd, program)
        .await
        .map_err(|source| SqueueError::Query { job_id, source })?;

    Ok(!stdout.trim().is_empty())
}

/// Blocks until a job is no longer listed by the queue command.
///
/// Polls on a fixed interval with no timeout; the cluster's own time
/// limits bound how long a job can stay queued.
#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    program: String,
    interval: Duration,
}

impl CompletionWaiter {
    /// `interval` is clamped to at least [`MIN_POLL_INTERVAL`].
    pub fn new(program: impl Into<String>, interval: Duration) -> Self {
        Self {
            program: program.into(),
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for `job_id` to leave the queue and return how long that took.
    pub async fn wait(&self, job_id: JobId) -> Result<Duration, SqueueError> {
        let started = Instant::now();
        tracing::info!("Waiting for job {} to finish", job_id);

        while job_in_queue(&self.program, job_id).await? {
            tracing::debug!(
                "Job {} still queued after {}",
                job_id,
                format_duration(started.elapsed())
            );
            tokio::time::sleep(self.interval).await;
        }

        let waited = started.elapsed();
        tracing::info!(
            "Job {} left the queue after {}",
            job_id,
            format_duration(waited)
        );
        Ok(waited)
    }
}

impl Default for CompletionWaiter {
    fn default() -> Self {
        Self::new("squeue", DEFAULT_POLL_INTERVAL)
    }
}
