//! Task scheduling and the task lifecycle.
//!
//! [`TaskScheduler::claim_task`] hands out the most urgent eligible PENDING
//! task. The scan runs on a plain read; the claim itself is a separate
//! transaction that re-checks the task is still PENDING and eligible before
//! writing the assignment, so two workers racing for the same task never both
//! win. The loser retries from a fresh scan.

mod graph;

pub use graph::cyclic_tasks;

use crate::context::{render_task_markdown, ContextAssembler};
use crate::db::{now_millis, EntityStore, StoreConn, TaskNode};
use crate::models::{
    FailureReport, NewTask, PendingFindingStatus, SavedState, Task, TaskBrief, TaskStatus,
    TicketStatus,
};
use crate::types::{AppError, Result};
use crate::utils::toml_config::LabConfigManager;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Selects and assigns work, and drives tasks through their states.
pub struct TaskScheduler {
    store: Arc<EntityStore>,
    config: Arc<LabConfigManager>,
    assembler: ContextAssembler,
}

impl TaskScheduler {
    pub fn new(store: Arc<EntityStore>, config: Arc<LabConfigManager>) -> Self {
        Self {
            assembler: ContextAssembler::new(Arc::clone(&config)),
            store,
            config,
        }
    }

    // ============== Claiming ==============

    /// Claims the next eligible task for `contributor_id`.
    ///
    /// Returns `None` when nothing is eligible, or when every attempt lost a
    /// race to another claimer (the caller should try again later).
    pub async fn claim_task(
        &self,
        contributor_id: &str,
        project_id: Option<&str>,
    ) -> Result<Option<Task>> {
        {
            let conn = self.store.read().await?;
            conn.require_contributor(contributor_id).await?;
            if let Some(project_id) = project_id {
                conn.require_project(project_id).await?;
            }
        }

        self.reclaim_expired().await?;
        self.block_cyclic_tasks().await?;

        let max_attempts = self.config.config().scheduler.max_claim_retries.max(1);
        for attempt in 1..=max_attempts {
            let Some(candidate) = self.next_candidate(contributor_id, project_id).await? else {
                debug!(contributor = %contributor_id, "no eligible task");
                return Ok(None);
            };

            match self.try_claim(&candidate, contributor_id).await {
                Ok(task) => {
                    info!(
                        task_id = %task.id,
                        task_type = %task.task_type,
                        priority = task.priority,
                        contributor = %contributor_id,
                        "task claimed"
                    );
                    return Ok(Some(task));
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        task_id = %candidate,
                        contributor = %contributor_id,
                        attempt,
                        "lost claim race: {}",
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            contributor = %contributor_id,
            attempts = max_attempts,
            "giving up on claim after repeated conflicts"
        );
        Ok(None)
    }

    /// First eligible PENDING task in claim order.
    async fn next_candidate(
        &self,
        contributor_id: &str,
        project_id: Option<&str>,
    ) -> Result<Option<String>> {
        let conn = self.store.read().await?;
        let graph = conn.task_graph().await?;
        let pending = conn.pending_tasks(project_id).await?;
        debug!(pending = pending.len(), "scanning backlog");

        for task in &pending {
            if is_eligible(&conn, &graph, task, contributor_id).await? {
                return Ok(Some(task.id.clone()));
            }
        }
        Ok(None)
    }

    async fn try_claim(&self, task_id: &str, contributor_id: &str) -> Result<Task> {
        let tx = self.store.begin().await?;
        let result = self.claim_in(&tx, task_id, contributor_id).await;
        tx.finish(result).await
    }

    async fn claim_in(&self, tx: &StoreConn<'_>, task_id: &str, contributor_id: &str) -> Result<Task> {
        let task = tx.require_task(task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(AppError::Conflict(format!(
                "task {} is {} instead of PENDING",
                task_id, task.status
            )));
        }

        let graph = tx.task_graph().await?;
        if !is_eligible(tx, &graph, &task, contributor_id).await? {
            return Err(AppError::Conflict(format!(
                "task {} is no longer eligible",
                task_id
            )));
        }

        let now = now_millis();
        // A task returned to the backlog by lease expiry keeps its first brief.
        let context = match &task.context {
            Some(existing) => existing.clone(),
            None => self.assembler.assemble(tx, &task).await?,
        };
        let markdown = match &task.context_markdown {
            Some(existing) => existing.clone(),
            None => render_task_markdown(&task, &context),
        };
        let lease = self.config.config().scheduler.lease_deadline(now);

        if !tx
            .mark_task_assigned(task_id, contributor_id, &context, &markdown, now, lease)
            .await?
        {
            return Err(AppError::Conflict(format!("task {} was claimed concurrently", task_id)));
        }
        tx.touch_contributor(contributor_id, now).await?;

        if let TaskBrief::ReResearch(brief) = &task.brief {
            tx.transition_pending_finding(
                &brief.pending_finding_ref,
                PendingFindingStatus::Rejected,
                PendingFindingStatus::ReResearching,
            )
            .await?;
        }

        tx.require_task(task_id).await
    }

    // ============== Lifecycle ==============

    /// Inserts a PENDING task after checking its project, parent and
    /// dependencies exist.
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task> {
        if new_task.brief.title().trim().is_empty() {
            return Err(AppError::validation("Task title is required"));
        }

        let tx = self.store.begin().await?;
        let result = create_task_in(&tx, new_task, now_millis()).await;
        let task = tx.finish(result).await?;

        info!(task_id = %task.id, task_type = %task.task_type, "task created");
        Ok(task)
    }

    /// ASSIGNED -> COMPLETED, crediting the assignee with the task and
    /// `tokens_used` in the same transaction.
    ///
    /// `contributor_id` must be the current assignee. A worker whose lease
    /// expired and whose task was re-claimed by someone else is refused.
    pub async fn complete_task(
        &self,
        task_id: &str,
        contributor_id: &str,
        result: &str,
        tokens_used: i64,
    ) -> Result<Task> {
        if tokens_used < 0 {
            return Err(AppError::validation("tokens_used must not be negative"));
        }

        let tx = self.store.begin().await?;
        let outcome = complete_in(&tx, task_id, contributor_id, result, tokens_used).await;
        let task = tx.finish(outcome).await?;

        info!(task_id = %task.id, tokens_used, "task completed");
        Ok(task)
    }

    /// ASSIGNED -> FAILED with a `{error, status}` result payload.
    pub async fn fail_task(&self, task_id: &str, contributor_id: &str, error: &str) -> Result<Task> {
        let payload = FailureReport::new(error).to_result_string();

        let tx = self.store.begin().await?;
        let outcome = fail_in(&tx, task_id, contributor_id, &payload).await;
        let task = tx.finish(outcome).await?;

        warn!(task_id = %task.id, error, "task failed");
        Ok(task)
    }

    /// Parks an ASSIGNED task until `ticket_id` is resolved.
    pub async fn suspend_task(
        &self,
        task_id: &str,
        contributor_id: &str,
        ticket_id: &str,
        snapshot: serde_json::Value,
    ) -> Result<Task> {
        let tx = self.store.begin().await?;
        let outcome = suspend_in(&tx, task_id, contributor_id, ticket_id, snapshot).await;
        let task = tx.finish(outcome).await?;

        info!(task_id = %task.id, ticket_id, "task suspended");
        Ok(task)
    }

    /// SUSPENDED -> ASSIGNED once the ticket it waits on is RESOLVED.
    pub async fn resume_task(&self, task_id: &str) -> Result<Task> {
        let scheduler = self.config.config().scheduler.clone();
        let tx = self.store.begin().await?;
        let outcome = resume_in(&tx, task_id, |now| scheduler.lease_deadline(now)).await;
        let task = tx.finish(outcome).await?;

        info!(task_id = %task.id, "task resumed");
        Ok(task)
    }

    /// SUSPENDED tasks of `contributor_id` whose ticket has been resolved.
    pub async fn resumable_tasks(&self, contributor_id: &str) -> Result<Vec<Task>> {
        let conn = self.store.read().await?;
        let mut resumable = Vec::new();
        for task in conn.suspended_tasks_for(contributor_id).await? {
            let Some(state) = &task.saved_state else {
                continue;
            };
            if let Some(ticket) = conn.get_ticket(&state.suspended_on_ticket).await? {
                if ticket.status == TicketStatus::Resolved {
                    resumable.push(task);
                }
            }
        }
        Ok(resumable)
    }

    // ============== Leases ==============

    /// Extends the lease of a task held by `contributor_id`. Returns the new
    /// expiry, or `None` when leases are disabled.
    pub async fn heartbeat(&self, task_id: &str, contributor_id: &str) -> Result<Option<i64>> {
        let deadline = self.config.config().scheduler.lease_deadline(now_millis());
        let tx = self.store.begin().await?;
        let outcome = heartbeat_in(&tx, task_id, contributor_id, deadline).await;
        tx.finish(outcome).await
    }

    /// Returns tasks with an expired lease to the backlog.
    pub async fn reclaim_expired(&self) -> Result<Vec<String>> {
        self.reclaim_expired_at(now_millis()).await
    }

    /// [`Self::reclaim_expired`] against an explicit clock reading (millis).
    pub async fn reclaim_expired_at(&self, now: i64) -> Result<Vec<String>> {
        let tx = self.store.begin().await?;
        let outcome = reclaim_in(&tx, now).await;
        tx.finish(outcome).await
    }

    /// Marks PENDING tasks on or behind a dependency cycle as BLOCKED.
    pub async fn block_cyclic_tasks(&self) -> Result<Vec<String>> {
        let tx = self.store.begin().await?;
        let outcome = block_cycles_in(&tx).await;
        tx.finish(outcome).await
    }
}

async fn complete_in(
    tx: &StoreConn<'_>,
    task_id: &str,
    contributor_id: &str,
    result: &str,
    tokens_used: i64,
) -> Result<Task> {
    require_assignee(tx, task_id, contributor_id).await?;
    let now = now_millis();
    if !tx.mark_task_completed(task_id, contributor_id, result, now).await? {
        return Err(AppError::Conflict(format!("task {} changed concurrently", task_id)));
    }
    tx.credit_contributor(contributor_id, tokens_used, now).await?;
    tx.require_task(task_id).await
}

async fn fail_in(tx: &StoreConn<'_>, task_id: &str, contributor_id: &str, payload: &str) -> Result<Task> {
    require_assignee(tx, task_id, contributor_id).await?;
    if !tx.mark_task_failed(task_id, contributor_id, payload, now_millis()).await? {
        return Err(AppError::Conflict(format!("task {} changed concurrently", task_id)));
    }
    tx.require_task(task_id).await
}

async fn suspend_in(
    tx: &StoreConn<'_>,
    task_id: &str,
    contributor_id: &str,
    ticket_id: &str,
    snapshot: serde_json::Value,
) -> Result<Task> {
    require_assignee(tx, task_id, contributor_id).await?;
    tx.require_ticket(ticket_id).await?;

    let state = SavedState {
        suspended_on_ticket: ticket_id.to_string(),
        snapshot,
        suspended_at: now_millis(),
    };
    if !tx.mark_task_suspended(task_id, contributor_id, &state).await? {
        return Err(AppError::Conflict(format!("task {} changed concurrently", task_id)));
    }
    tx.require_task(task_id).await
}

async fn resume_in(
    tx: &StoreConn<'_>,
    task_id: &str,
    lease_deadline: impl Fn(i64) -> Option<i64>,
) -> Result<Task> {
    let task = tx.require_task(task_id).await?;
    if task.status != TaskStatus::Suspended {
        return Err(AppError::validation(format!(
            "Task {} is {}, not SUSPENDED",
            task_id, task.status
        )));
    }
    let ticket_id = task
        .saved_state
        .as_ref()
        .map(|s| s.suspended_on_ticket.clone())
        .ok_or_else(|| AppError::Internal(format!("task {} has no saved state", task_id)))?;
    let ticket = tx.require_ticket(&ticket_id).await?;
    if ticket.status != TicketStatus::Resolved {
        return Err(AppError::validation(format!(
            "Ticket {} is {}, not RESOLVED",
            ticket.ticket_id, ticket.status
        )));
    }

    let now = now_millis();
    if !tx.mark_task_resumed(task_id, now, lease_deadline(now)).await? {
        return Err(AppError::Conflict(format!("task {} changed concurrently", task_id)));
    }
    tx.require_task(task_id).await
}

async fn heartbeat_in(
    tx: &StoreConn<'_>,
    task_id: &str,
    contributor_id: &str,
    deadline: Option<i64>,
) -> Result<Option<i64>> {
    require_assignee(tx, task_id, contributor_id).await?;

    let Some(deadline) = deadline else {
        return Ok(None);
    };
    tx.extend_task_lease(task_id, contributor_id, deadline).await?;
    Ok(Some(deadline))
}

async fn reclaim_in(tx: &StoreConn<'_>, now: i64) -> Result<Vec<String>> {
    let mut reclaimed = Vec::new();
    for task in tx.expired_assignments(now).await? {
        if let Some(pf_ref) = task.pending_finding_ref() {
            let Some(pf) = tx.get_pending_finding(pf_ref).await? else {
                continue;
            };
            let assignee = task.assigned_to.as_deref().unwrap_or_default();
            if pf.votes.iter().any(|v| v.verifier == assignee) {
                // The vote is in; only the completion report is outstanding.
                debug!(task_id = %task.id, assignee, "expired verify task already voted, kept");
                continue;
            }
            if pf.status != PendingFindingStatus::PendingVerification {
                let reason = closed_verification_reason(&pf.finding_id, pf.status);
                if tx.close_verify_task(&task.id, &reason, now).await? {
                    info!(task_id = %task.id, finding_id = %pf.finding_id, "expired verify task closed");
                }
                continue;
            }
        }

        if tx.release_task(&task.id, now).await? {
            warn!(
                task_id = %task.id,
                assignee = task.assigned_to.as_deref().unwrap_or("-"),
                "lease expired, task returned to backlog"
            );
            reclaimed.push(task.id);
        }
    }
    Ok(reclaimed)
}

async fn block_cycles_in(tx: &StoreConn<'_>) -> Result<Vec<String>> {
    let graph = tx.task_graph().await?;
    let mut cyclic: Vec<String> = cyclic_tasks(&graph).into_iter().collect();
    cyclic.sort();

    let mut blocked = Vec::new();
    for id in cyclic {
        if tx.mark_task_blocked(&id).await? {
            warn!(task_id = %id, "dependency cycle detected, task blocked");
            blocked.push(id);
        }
    }
    Ok(blocked)
}

/// Inserts a task inside an open transaction. Shared by the engines that
/// spawn follow-up work.
pub(crate) async fn create_task_in(tx: &StoreConn<'_>, new_task: NewTask, now: i64) -> Result<Task> {
    tx.require_project(&new_task.project_id).await?;
    if let Some(parent_id) = &new_task.parent_id {
        tx.require_task(parent_id).await?;
    }
    for dep in &new_task.depends_on {
        tx.require_task(dep).await?;
    }

    let task = new_task.into_task(now);
    tx.insert_task(&task).await?;
    Ok(task)
}

/// Loads an ASSIGNED task held by `contributor_id`.
async fn require_assignee(tx: &StoreConn<'_>, task_id: &str, contributor_id: &str) -> Result<Task> {
    let task = tx.require_task(task_id).await?;
    if task.status != TaskStatus::Assigned {
        return Err(AppError::validation(format!(
            "Task {} is {}, not ASSIGNED",
            task_id, task.status
        )));
    }
    if task.assigned_to.as_deref() != Some(contributor_id) {
        return Err(AppError::validation(format!(
            "Task {} is not assigned to {}",
            task_id, contributor_id
        )));
    }
    Ok(task)
}

/// Result payload of a VERIFY task retired because its finding was decided.
pub(crate) fn closed_verification_reason(finding_id: &str, status: PendingFindingStatus) -> String {
    FailureReport::new(format!("Verification of {} closed ({})", finding_id, status)).to_result_string()
}

/// Whether `contributor_id` may take `task` right now.
///
/// Every dependency must be COMPLETED. A VERIFY task is only handed out while
/// its finding is still PENDING_VERIFICATION, and never to the submitter, to
/// anyone who already voted on it, or to anyone holding a sibling verify task.
async fn is_eligible(
    conn: &StoreConn<'_>,
    graph: &HashMap<String, TaskNode>,
    task: &Task,
    contributor_id: &str,
) -> Result<bool> {
    let deps_done = task.depends_on.iter().all(|dep| {
        graph
            .get(dep)
            .is_some_and(|node| node.status == TaskStatus::Completed)
    });
    if !deps_done {
        return Ok(false);
    }

    let Some(pf_ref) = task.pending_finding_ref() else {
        return Ok(true);
    };
    let Some(pf) = conn.get_pending_finding(pf_ref).await? else {
        return Ok(false);
    };
    if pf.status != PendingFindingStatus::PendingVerification {
        return Ok(false);
    }
    if pf.submitted_by == contributor_id || pf.votes.iter().any(|v| v.verifier == contributor_id) {
        return Ok(false);
    }

    for sibling_id in pf.verify_task_ids.iter().filter(|id| **id != task.id) {
        if let Some(sibling) = conn.get_task(sibling_id).await? {
            if sibling.assigned_to.as_deref() == Some(contributor_id) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
