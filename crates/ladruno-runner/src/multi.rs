//! Fan-out over every model under a root directory.

use crate::config::{RunConfig, SubmitOptions};
use crate::error::RunError;
use crate::run::{ModelRun, Submission};
use camino::{Utf8Path, Utf8PathBuf};
use ladruno_core::discover_models;

/// Outcome of submitting one model of a [`MultiRun`].
#[derive(Debug)]
pub struct RunOutcome {
    pub path: Utf8PathBuf,
    pub result: Result<Submission, RunError>,
}

/// Every model directory found under one root.
#[derive(Debug)]
pub struct MultiRun {
    runs: Vec<ModelRun>,
}

impl MultiRun {
    /// Collect the models under `root`, sharing one configuration.
    pub fn discover(root: &Utf8Path, config: &RunConfig) -> Result<Self, RunError> {
        let runs = discover_models(root, &config.entry_point)?
            .into_iter()
            .map(|model| ModelRun::from_model(model, config.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Found {} model(s) under {}", runs.len(), root);
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[ModelRun] {
        &self.runs
    }

    /// Submit the models one after another.
    ///
    /// A failing model is logged and recorded; the rest are still
    /// submitted.
    pub async fn submit_all(&self, opts: &SubmitOptions) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(self.runs.len());
        for (i, run) in self.runs.iter().enumerate() {
            tracing::info!("[{:02}/{:02}] Submitting {}", i + 1, self.runs.len(), run.path());
            let result = run.submit(opts).await;
            match &result {
                Ok(submission) => tracing::info!("{}: job {}", run.name(), submission.job_id),
                Err(e) => tracing::error!("{}: {}", run.path(), e),
            }
            outcomes.push(RunOutcome {
                path: run.path().to_owned(),
                result,
            });
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::tests::Sandbox;
    use ladruno_slurm::JobId;

    #[test]
    fn test_discover_sorted() {
        let sb = Sandbox::new();
        sb.model("b_case");
        sb.model("a_case/deeper");
        sb.model("a_case");

        let multi = MultiRun::discover(&sb.runs(), &sb.config(1)).unwrap();
        let names: Vec<&str> = multi.runs().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["a_case", "deeper", "b_case"]);
    }

    #[test]
    fn test_discover_root_model_only() {
        let sb = Sandbox::new();
        let root = sb.model("parent");
        sb.model("parent/child");

        let multi = MultiRun::discover(&root, &sb.config(1)).unwrap();
        assert_eq!(multi.runs().len(), 1);
        assert_eq!(multi.runs()[0].path(), root.as_path());
    }

    #[test]
    fn test_discover_nothing() {
        let sb = Sandbox::new();
        let err = MultiRun::discover(&sb.runs(), &sb.config(1)).unwrap_err();
        assert!(matches!(err, RunError::Model(_)));
    }

    #[tokio::test]
    async fn test_submit_all_continues_after_failure() {
        let sb = Sandbox::new();
        sb.model("a_good");
        sb.model("b_bad");
        sb.model("c_good");

        let mut config = sb.config(1);
        config.slurm.submit = sb.command(
            "sbatch",
            "case \"$(pwd)\" in\n  *b_bad) echo 'rejected' >&2; exit 1 ;;\nesac\necho \"Submitted batch job 42\"",
        );

        let multi = MultiRun::discover(&sb.runs(), &config).unwrap();
        let outcomes = multi.submit_all(&SubmitOptions::default()).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[1].path.ends_with("b_bad"));
        assert_eq!(
            outcomes[2].result.as_ref().unwrap().job_id,
            JobId::new(42)
        );
    }
}
