//! One model directory through build, submit and archive.

use crate::config::{ArchiveMode, ArchiveSettings, RunConfig, SubmitOptions};
use crate::error::RunError;
use camino::{Utf8Path, Utf8PathBuf};
use ladruno_archive::Archiver;
use ladruno_core::{
    AllocationPlan, ArchiveEpilogue, BatchScript, MemoryMonitor, ModelDir, PartitionScanner,
    ResourceRequest, ScriptBuilder, plan_allocation,
};
use ladruno_slurm::{JobId, submit_script};
use serde::Serialize;

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub script: Utf8PathBuf,
    /// Set when the directory was archived after the job ended
    pub archived_to: Option<Utf8PathBuf>,
}

/// A model directory and the settings it runs with.
#[derive(Debug, Clone)]
pub struct ModelRun {
    model: ModelDir,
    config: RunConfig,
    scanner: PartitionScanner,
}

impl ModelRun {
    /// Fails if `path` does not contain the configured entry point.
    pub fn new(path: &Utf8Path, config: RunConfig) -> Result<Self, RunError> {
        let model = ModelDir::open(path, &config.entry_point)?;
        Self::from_model(model, config)
    }

    pub fn from_model(model: ModelDir, config: RunConfig) -> Result<Self, RunError> {
        let scanner = PartitionScanner::new(&config.partition_pattern)?;
        Ok(Self {
            model,
            config,
            scanner,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        self.model.path()
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn script_path(&self) -> Utf8PathBuf {
        self.path().join(&self.config.script_name)
    }

    /// Tasks needed by the partition files currently on disk.
    pub fn required_tasks(&self) -> u32 {
        self.scanner.required_tasks(self.path())
    }

    pub fn plan(&self) -> Result<AllocationPlan, RunError> {
        let tasks = self.required_tasks();
        let plan = plan_allocation(tasks, &self.config.capacity)?;
        tracing::info!(
            "{}: nodes={}, ntasks={}{}",
            self.name(),
            plan.nodes,
            plan.tasks,
            if plan.capped { " (capped)" } else { "" }
        );
        Ok(plan)
    }

    /// Resource header for a submission. Fixed nodes and tasks bypass the
    /// planner; either one alone is ignored. Whatever the source, the
    /// request must hold every task within the node capacity.
    pub fn resources(&self, opts: &SubmitOptions) -> Result<ResourceRequest, RunError> {
        let request = match (opts.nodes, opts.tasks, opts.tasks_per_node) {
            (Some(nodes), Some(tasks), Some(tpn)) => ResourceRequest::Explicit {
                nodes: nodes.max(1),
                tasks: tasks.max(1),
                tasks_per_node: tpn.max(1),
            },
            (Some(nodes), Some(tasks), None) => ResourceRequest::NodesAndTasks {
                nodes: nodes.max(1),
                tasks: tasks.max(1),
            },
            _ => ResourceRequest::from_plan(&self.plan()?, opts.tasks_per_node),
        };
        request.check(&self.config.capacity)?;
        Ok(request)
    }

    /// Job name from the options, else the directory name.
    pub fn job_name(&self, opts: &SubmitOptions) -> String {
        match &opts.job_name {
            Some(name) => name.clone(),
            None => self
                .name()
                .chars()
                .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
                .collect(),
        }
    }

    pub fn build_script(&self, opts: &SubmitOptions) -> Result<BatchScript, RunError> {
        let monitor = opts.monitor.as_ref().map(|m| {
            MemoryMonitor::new(self.config.process_match())
                .with_interval(m.interval)
                .with_log_file(m.log_file.clone())
        });
        let epilogue = match opts.archive {
            ArchiveMode::InScript => Some(self.epilogue(self.archive_settings()?)?),
            ArchiveMode::None | ArchiveMode::External => None,
        };

        let script = ScriptBuilder::new(
            self.job_name(opts),
            self.resources(opts)?,
            self.config.executable.clone(),
            self.model.entry_point(),
        )
        .output_log(self.config.output_log.clone())
        .exclude(opts.exclude.iter().cloned())
        .library_dirs(self.config.library_dirs.iter().cloned())
        .launcher(self.config.launcher.clone())
        .monitor(monitor)
        .epilogue(epilogue)
        .build()?;
        Ok(script)
    }

    /// Render and write the batch script into the model directory.
    pub fn write_script(&self, opts: &SubmitOptions) -> Result<Utf8PathBuf, RunError> {
        let script = self.build_script(opts)?;
        Ok(script.write(self.path(), &self.config.script_name)?)
    }

    /// Write (or reuse) the script, submit it and, for
    /// [`ArchiveMode::External`], wait for the job and archive the directory.
    pub async fn submit(&self, opts: &SubmitOptions) -> Result<Submission, RunError> {
        let archiver = match opts.archive {
            ArchiveMode::External => {
                let archiver = self.archiver()?;
                archiver.roots().destination_for(self.path())?;
                Some(archiver)
            }
            ArchiveMode::None | ArchiveMode::InScript => None,
        };

        let script = if opts.rebuild {
            self.write_script(opts)?
        } else {
            let script = self.script_path();
            if !script.is_file() {
                return Err(RunError::MissingScript(script));
            }
            tracing::info!("Reusing {}", script);
            script
        };

        let job_id = submit_script(&self.config.slurm.submit, &script, self.path()).await?;

        let archived_to = match archiver {
            Some(archiver) => Some(
                archiver
                    .archive_after_finish(self.path(), job_id, opts.fix_flags)
                    .await
                    .map_err(|source| RunError::ArchiveAfterSubmit { job_id, source })?,
            ),
            None => None,
        };

        Ok(Submission {
            job_id,
            script,
            archived_to,
        })
    }

    fn archive_settings(&self) -> Result<&ArchiveSettings, RunError> {
        self.config
            .archive
            .as_ref()
            .ok_or(RunError::ArchiveNotConfigured)
    }

    fn archiver(&self) -> Result<Archiver, RunError> {
        Ok(self
            .archive_settings()?
            .archiver(self.config.slurm.queue.clone()))
    }

    fn epilogue(&self, settings: &ArchiveSettings) -> Result<ArchiveEpilogue, RunError> {
        let destination = settings.roots.destination_for(self.path())?;
        Ok(ArchiveEpilogue::new(destination)
            .with_status_file(settings.status_file.clone())
            .with_success_marker(settings.success_marker.clone()))
    }
}
