//! Worker side of the protocol.
//!
//! A [`WorkerLoop`] claims tasks for one contributor, hands each frozen brief
//! to an [`AgentExecutor`] and reports the outcome through `complete_task`.
//! Executor failures are recorded as a `{error, status: FAILED}` result rather
//! than dropped.

use crate::models::{FailureReport, Task};
use crate::scheduler::TaskScheduler;
use crate::types::{AppError, Result};
use crate::utils::toml_config::LabConfigManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// What an executor produced for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub result: String,
    pub tokens_used: i64,
}

/// Runs a claimed task. Implementations wrap an LLM agent runtime or a
/// human.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Executes `task` given its frozen markdown brief.
    async fn execute(&self, task: &Task, brief: &str) -> Result<ExecutionOutput>;
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStep {
    /// Nothing was eligible.
    Idle,
    Completed { task_id: String },
    Failed { task_id: String, error: String },
}

pub struct WorkerLoop {
    scheduler: Arc<TaskScheduler>,
    executor: Arc<dyn AgentExecutor>,
    config: Arc<LabConfigManager>,
    contributor_id: String,
    project_id: Option<String>,
}

const MISSING_BRIEF: &str = "# TASK.md\n\nNo context available.";

impl WorkerLoop {
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        executor: Arc<dyn AgentExecutor>,
        config: Arc<LabConfigManager>,
        contributor_id: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            executor,
            config,
            contributor_id: contributor_id.into(),
            project_id: None,
        }
    }

    /// Only claim work from this project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Claims and executes at most one task.
    ///
    /// Errors are store or claim errors; executor failures are reported and
    /// come back as [`LoopStep::Failed`].
    pub async fn run_once(&self) -> Result<LoopStep> {
        let Some(task) = self
            .scheduler
            .claim_task(&self.contributor_id, self.project_id.as_deref())
            .await?
        else {
            return Ok(LoopStep::Idle);
        };

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = task.priority,
            title = task.title(),
            "claimed task"
        );

        let brief = task.context_markdown.as_deref().unwrap_or(MISSING_BRIEF);
        match self.executor.execute(&task, brief).await {
            Ok(output) => {
                self.scheduler
                    .complete_task(
                        &task.id,
                        &self.contributor_id,
                        &output.result,
                        output.tokens_used,
                    )
                    .await?;
                Ok(LoopStep::Completed { task_id: task.id })
            }
            Err(e) => {
                let message = match e {
                    AppError::Execution(message) => message,
                    other => other.to_string(),
                };
                warn!(task_id = %task.id, error = %message, "task execution failed");

                let payload = FailureReport::new(message.clone()).to_result_string();
                if let Err(report_err) = self
                    .scheduler
                    .complete_task(&task.id, &self.contributor_id, &payload, 0)
                    .await
                {
                    error!(task_id = %task.id, error = %report_err, "failed to report task failure");
                }
                Ok(LoopStep::Failed {
                    task_id: task.id,
                    error: message,
                })
            }
        }
    }

    /// Runs until `shutdown` turns true. The current task always finishes
    /// before the loop stops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(contributor = %self.contributor_id, "worker loop started");

        while !*shutdown.borrow() {
            let wait = match self.run_once().await {
                Ok(LoopStep::Idle) => {
                    let secs = self.config.config().worker.idle_wait_secs;
                    info!(secs, "no tasks available");
                    Duration::from_secs(secs)
                }
                Ok(_) => continue,
                Err(e) => {
                    let secs = self.config.config().worker.error_backoff_secs;
                    error!(error = %e, secs, "worker loop error");
                    Duration::from_secs(secs)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(contributor = %self.contributor_id, "worker loop stopped");
    }
}
