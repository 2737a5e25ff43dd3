//! Hypothesis intake.
//!
//! Every accepted hypothesis immediately gets a RESEARCH task that carries its
//! test plan, and moves to TESTING in the same transaction.

use crate::db::{now_millis, EntityStore, IdKind, StoreConn};
use crate::models::{
    Hypothesis, HypothesisRef, HypothesisStatus, HypothesisVerdict, NewHypothesis, NewTask,
    ResearchBrief, TaskBrief,
};
use crate::scheduler::create_task_in;
use crate::types::{AppError, Result};
use crate::utils::toml_config::LabConfigManager;
use std::sync::Arc;
use tracing::info;

pub struct HypothesisEngine {
    store: Arc<EntityStore>,
    config: Arc<LabConfigManager>,
}

impl HypothesisEngine {
    pub fn new(store: Arc<EntityStore>, config: Arc<LabConfigManager>) -> Self {
        Self { store, config }
    }

    /// Validates and records a hypothesis, then queues its test task.
    ///
    /// A statement equal to a live (non-ABANDONED) hypothesis of the same
    /// project, ignoring case and surrounding whitespace, is rejected.
    pub async fn submit_hypothesis(&self, input: NewHypothesis) -> Result<Hypothesis> {
        if input.statement.trim().is_empty() {
            return Err(AppError::validation("Hypothesis statement is required"));
        }
        if input.test_plan.trim().is_empty() {
            return Err(AppError::validation("Test plan is required"));
        }

        let priority = self.config.config().scheduler.hypothesis_priority;
        let tx = self.store.begin().await?;
        let outcome = submit_in(&tx, input, priority).await;
        let hypothesis = tx.finish(outcome).await?;

        info!(
            hypothesis_id = %hypothesis.hypothesis_id,
            test_task = hypothesis.test_task_id.as_deref().unwrap_or("-"),
            "hypothesis submitted"
        );
        Ok(hypothesis)
    }

    /// Records the outcome of a hypothesis. Any current status may be
    /// overwritten.
    pub async fn resolve_hypothesis(
        &self,
        id: &str,
        verdict: HypothesisVerdict,
        result: Option<&str>,
    ) -> Result<Hypothesis> {
        let tx = self.store.begin().await?;
        let outcome = resolve_in(&tx, id, verdict, result).await;
        let hypothesis = tx.finish(outcome).await?;

        info!(hypothesis_id = %hypothesis.hypothesis_id, status = %hypothesis.status, "hypothesis resolved");
        Ok(hypothesis)
    }
}

fn normalize(statement: &str) -> String {
    statement.trim().to_lowercase()
}

async fn submit_in(tx: &StoreConn<'_>, input: NewHypothesis, priority: i32) -> Result<Hypothesis> {
    tx.require_project(&input.project_id).await?;
    tx.require_task(&input.task_id).await?;
    tx.require_contributor(&input.user_id).await?;

    let wanted = normalize(&input.statement);
    if let Some(existing) = tx
        .live_hypotheses(&input.project_id)
        .await?
        .into_iter()
        .find(|h| normalize(&h.statement) == wanted)
    {
        return Err(AppError::validation(format!(
            "Overlaps with existing hypothesis {}: {}",
            existing.hypothesis_id, existing.statement
        )));
    }

    let now = now_millis();
    let mut hypothesis = Hypothesis {
        id: uuid::Uuid::new_v4().to_string(),
        hypothesis_id: tx.allocate_id(&input.project_id, IdKind::Hypothesis).await?,
        project_id: input.project_id,
        statement: input.statement,
        rationale: input.rationale,
        test_plan: input.test_plan,
        based_on: input.based_on,
        status: HypothesisStatus::Proposed,
        test_task_id: None,
        result: None,
        created_by_task: input.task_id,
        created_by: input.user_id,
        created_at: now,
        resolved_at: None,
    };
    tx.insert_hypothesis(&hypothesis).await?;

    let test = NewTask {
        project_id: hypothesis.project_id.clone(),
        parent_id: None,
        priority,
        depends_on: Vec::new(),
        brief: TaskBrief::Research(ResearchBrief {
            title: format!("Test hypothesis: {}", hypothesis.statement),
            description: hypothesis.test_plan.clone(),
            question: None,
            hypothesis: Some(HypothesisRef {
                hypothesis_id: hypothesis.hypothesis_id.clone(),
                statement: hypothesis.statement.clone(),
                rationale: hypothesis.rationale.clone(),
                test_plan: hypothesis.test_plan.clone(),
                based_on: hypothesis.based_on.clone(),
            }),
        }),
    };
    let test_task = create_task_in(tx, test, now).await?;

    if !tx.start_hypothesis_test(&hypothesis.id, &test_task.id).await? {
        return Err(AppError::Internal(format!(
            "hypothesis {} left PROPOSED before its test task was linked",
            hypothesis.hypothesis_id
        )));
    }
    hypothesis.status = HypothesisStatus::Testing;
    hypothesis.test_task_id = Some(test_task.id);
    Ok(hypothesis)
}

async fn resolve_in(
    tx: &StoreConn<'_>,
    id: &str,
    verdict: HypothesisVerdict,
    result: Option<&str>,
) -> Result<Hypothesis> {
    tx.require_hypothesis(id).await?;
    tx.set_hypothesis_outcome(id, verdict.into(), result, now_millis())
        .await?;
    tx.require_hypothesis(id).await
}
