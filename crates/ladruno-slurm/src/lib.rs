//! SLURM integration for ladruno.
//!
//! Submit batch scripts via sbatch and wait on them via squeue.

pub mod sbatch;
pub mod squeue;
pub mod types;

pub use sbatch::{SbatchError, parse_job_id, submit_script};
pub use squeue::{
    CompletionWaiter, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, SqueueError, job_in_queue,
};
pub use types::{JobId, SlurmCommands};
