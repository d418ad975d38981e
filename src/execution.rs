use std::time::Instant;

use crate::{
    context::Context,
    error::Result,
    extract::extract_libchromiumcontent,
    task::{Action, Task},
    upload::{Uploader, upload_dist},
    util::Executor,
};

/// Runs resolved plans one task at a time against a fixed [`Context`].
pub struct TaskRunner<'a, E, U> {
    context: &'a Context,
    executor: &'a E,
    uploader: &'a U,
}

impl<'a, E: Executor, U: Uploader> TaskRunner<'a, E, U> {
    pub fn new(context: &'a Context, executor: &'a E, uploader: &'a U) -> Self {
        Self {
            context,
            executor,
            uploader,
        }
    }

    /// Executes `plan` strictly in order. The first failure is returned and no
    /// later task starts.
    pub async fn run_plan(&self, plan: &[&Task]) -> Result<()> {
        let started = Instant::now();

        for task in plan {
            if let Err(err) = self.run_task(task).await {
                tracing::error!(task = %task.id, "task failed: {}", err);
                return Err(err);
            }
        }

        tracing::info!(
            tasks = plan.len(),
            elapsed = %humantime::format_duration(round_to_millis(started.elapsed())),
            "all tasks finished"
        );
        Ok(())
    }

    pub async fn run_task(&self, task: &Task) -> Result<()> {
        let Some(action) = &task.action else {
            tracing::debug!(task = %task.id, "sequence complete");
            return Ok(());
        };

        tracing::info!(task = %task.id, "starting");
        let started = Instant::now();

        match action {
            Action::Command(spec) => {
                tracing::info!(task = %task.id, command = %spec, "running");
                self.executor.run(spec, &self.context.root).await?;
            }
            Action::ExtractLibchromiumcontent => {
                extract_libchromiumcontent(
                    &self.context.root,
                    &self.context.python,
                    &self.context.extract,
                    self.executor,
                )
                .await?;
            }
            Action::UploadDist => {
                let artifact = upload_dist(
                    &self.context.root,
                    &self.context.platform,
                    &self.context.ftp,
                    self.uploader,
                )
                .await?;
                tracing::info!(task = %task.id, file = %artifact.file_name, "uploaded");
            }
        }

        tracing::info!(
            task = %task.id,
            elapsed = %humantime::format_duration(round_to_millis(started.elapsed())),
            "finished"
        );
        Ok(())
    }
}

fn round_to_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(duration.as_millis() as u64)
}
