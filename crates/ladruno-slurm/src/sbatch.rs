//! Submit batch scripts via sbatch.

use crate::types::JobId;
use camino::Utf8Path;
use ladruno_parsers::{CommandError, last_token, run_command};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum SbatchError {
    #[error("Failed to submit {script}: {source}")]
    Submit {
        script: String,
        #[source]
        source: CommandError,
    },
    #[error("Failed to parse job id from sbatch output: {0:?}")]
    ParseError(String),
}

/// Extract the job id from the last whitespace-delimited token of sbatch output.
pub fn parse_job_id(stdout: &str) -> Result<JobId, SbatchError> {
    last_token(stdout)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| SbatchError::ParseError(stdout.trim().to_string()))
}

/// Submit `script` with `program` from inside `workdir`.
///
/// There is no retry: a failing sbatch is almost always a bad directive
/// or a bad account, and the scheduler's message is surfaced as is.
pub async fn submit_script(
    program: &str,
    script: &Utf8Path,
    workdir: &Utf8Path,
) -> Result<JobId, SbatchError> {
    let mut cmd = Command::new(program);
    cmd.arg(script.as_str()).current_dir(workdir);

    let stdout = run_command(&mut cmd, program)
        .await
        .map_err(|source| SbatchError::Submit {
            script: script.to_string(),
            source,
        })?;

    let job_id = parse_job_id(&stdout)?;
    tracing::info!("Submitted batch job {} ({})", job_id, script);
    Ok(job_id)
}
