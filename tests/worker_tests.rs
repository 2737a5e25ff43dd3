mod common;

use async_trait::async_trait;
use common::Lab;
use openlab::models::{Task, TaskStatus};
use openlab::types::{AppError, Result};
use openlab::worker::LoopStep;
use openlab::{AgentExecutor, ExecutionOutput, WorkerLoop};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ============= Mock Executors =============

/// Records every brief it receives and answers with a fixed result.
#[derive(Default)]
struct RecordingExecutor {
    briefs: Mutex<Vec<String>>,
}

#[async_trait]
impl AgentExecutor for RecordingExecutor {
    async fn execute(&self, task: &Task, brief: &str) -> Result<ExecutionOutput> {
        self.briefs.lock().push(brief.to_string());
        Ok(ExecutionOutput {
            result: format!("done: {}", task.title()),
            tokens_used: 250,
        })
    }
}

struct FailingExecutor;

#[async_trait]
impl AgentExecutor for FailingExecutor {
    async fn execute(&self, _task: &Task, _brief: &str) -> Result<ExecutionOutput> {
        Err(AppError::Execution("agent exited with status 137".to_string()))
    }
}

fn worker(lab: &Lab, executor: Arc<dyn AgentExecutor>, contributor_id: &str) -> WorkerLoop {
    WorkerLoop::new(
        Arc::clone(&lab.state.scheduler),
        executor,
        Arc::clone(&lab.state.config_manager),
        contributor_id,
    )
}

#[tokio::test]
async fn test_run_once_executes_frozen_brief() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    let task = lab.research_task(&project, "Collect IEDB export", 5, &[]).await;

    let executor = Arc::new(RecordingExecutor::default());
    let worker = worker(&lab, executor.clone(), &alice.id);

    let step = worker.run_once().await.unwrap();
    assert_eq!(step, LoopStep::Completed { task_id: task.id.clone() });

    let stored = lab.state.queries.task(&task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.result.as_deref(), Some("done: Collect IEDB export"));

    let briefs = executor.briefs.lock().clone();
    assert_eq!(briefs.len(), 1);
    assert_eq!(Some(&briefs[0]), stored.context_markdown.as_ref());

    let alice = lab.state.queries.contributor(&alice.id).await.unwrap();
    assert_eq!(alice.tokens_contributed, 250);

    assert_eq!(worker.run_once().await.unwrap(), LoopStep::Idle);
}

#[tokio::test]
async fn test_executor_failure_is_reported_as_payload() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    let task = lab.research_task(&project, "Collect IEDB export", 5, &[]).await;

    let worker = worker(&lab, Arc::new(FailingExecutor), &alice.id);
    let step = worker.run_once().await.unwrap();
    assert_eq!(
        step,
        LoopStep::Failed {
            task_id: task.id.clone(),
            error: "agent exited with status 137".to_string(),
        }
    );

    let stored = lab.state.queries.task(&task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    let payload: serde_json::Value = serde_json::from_str(&stored.result.unwrap()).unwrap();
    assert_eq!(payload["error"], "agent exited with status 137");
    assert_eq!(payload["status"], "FAILED");
}

#[tokio::test]
async fn test_worker_scoped_to_project() {
    let lab = Lab::new().await;
    let onco = lab.project("oncology").await;
    let immuno = lab.project("immunology").await;
    let alice = lab.contributor("alice").await;
    lab.research_task(&onco, "Oncology only", 1, &[]).await;

    let worker = worker(&lab, Arc::new(RecordingExecutor::default()), &alice.id)
        .with_project(immuno.id.clone());
    assert_eq!(worker.run_once().await.unwrap(), LoopStep::Idle);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    for i in 0..3 {
        lab.research_task(&project, &format!("Task {}", i), 5, &[])
            .await;
    }

    let executor = Arc::new(RecordingExecutor::default());
    let worker = worker(&lab, executor.clone(), &alice.id);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move { worker.run(rx).await });

    // The loop drains the backlog, then idles until told to stop.
    tokio::time::timeout(Duration::from_secs(5), async {
        while executor.briefs.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker did not drain the backlog");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();

    let stats = lab.state.queries.dashboard_stats(None).await.unwrap();
    assert_eq!(stats.completed_tasks, 3);
}
