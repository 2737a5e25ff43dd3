//! Verification consensus.
//!
//! A submitted finding enters the knowledge base only after three independent
//! contributors have verified it. Submission creates the pending finding and
//! its three VERIFY tasks together; the third vote decides the outcome in the
//! same transaction that records it:
//!
//! - three PASS votes promote it to a verified `F-nnn` finding;
//! - any FAIL rejects it and forks one RESEARCH task carrying the verifiers'
//!   notes, so the work is redone rather than lost.

use crate::db::{now_millis, EntityStore, IdKind, StoreConn};
use crate::models::{
    DeadEnd, Finding, NewDeadEnd, NewFinding, NewTask, PendingFinding, PendingFindingSnapshot,
    PendingFindingStatus, ReResearchBrief, Task, TaskBrief, TaskStatus, Verdict,
    VerificationFeedback, VerifyBrief, Vote,
};
use crate::scheduler::{closed_verification_reason, create_task_in};
use crate::types::{AppError, Result};
use crate::utils::toml_config::LabConfigManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Votes needed before a pending finding is decided.
pub const QUORUM: usize = 3;

const VERIFY_DESCRIPTION: &str = "Independently verify the following finding. Check sources, \
     reproduce claims, cross-reference with known findings. Cast PASS or FAIL.";

const RE_RESEARCH_DESCRIPTION: &str = "A previous finding was rejected during verification. \
     Re-investigate and either fix the finding or record it as a dead end.";

/// What a recorded vote led to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// Quorum not reached yet.
    Recorded { votes_cast: usize },
    /// Unanimous PASS: the finding is now in the knowledge base.
    Verified { finding: Finding },
    /// At least one FAIL: a re-research fork was queued.
    Rejected {
        rejection_context: String,
        re_research_task: Task,
    },
}

pub struct ConsensusEngine {
    store: Arc<EntityStore>,
    config: Arc<LabConfigManager>,
}

impl ConsensusEngine {
    pub fn new(store: Arc<EntityStore>, config: Arc<LabConfigManager>) -> Self {
        Self { store, config }
    }

    /// Records a finding for verification and queues its three VERIFY tasks.
    pub async fn submit_finding(&self, input: NewFinding) -> Result<PendingFinding> {
        if input.title.trim().is_empty() {
            return Err(AppError::validation("Finding title is required"));
        }
        if input.source.trim().is_empty() {
            return Err(AppError::validation("Finding source is required"));
        }

        let verify_priority = self.config.config().scheduler.verify_priority;
        let tx = self.store.begin().await?;
        let outcome = submit_in(&tx, input, verify_priority).await;
        let pf = tx.finish(outcome).await?;

        info!(
            finding_id = %pf.finding_id,
            attempt = pf.attempt,
            verify_tasks = pf.verify_task_ids.len(),
            "finding submitted for verification"
        );
        Ok(pf)
    }

    /// Records one verifier's vote and, on the quorum vote, decides the
    /// finding.
    pub async fn cast_vote(
        &self,
        pending_finding_id: &str,
        verifier_id: &str,
        verdict: Verdict,
        notes: &str,
    ) -> Result<VoteOutcome> {
        let fork_priority = self.config.config().scheduler.re_research_priority;
        let tx = self.store.begin().await?;
        let outcome = vote_in(&tx, pending_finding_id, verifier_id, verdict, notes, fork_priority).await;
        let outcome = tx.finish(outcome).await?;

        match &outcome {
            VoteOutcome::Recorded { votes_cast } => {
                info!(pending_finding = %pending_finding_id, %verdict, votes_cast, "vote recorded")
            }
            VoteOutcome::Verified { finding } => {
                info!(finding_id = %finding.finding_id, "finding verified")
            }
            VoteOutcome::Rejected {
                re_research_task, ..
            } => info!(
                pending_finding = %pending_finding_id,
                fork = %re_research_task.id,
                "finding rejected, re-research queued"
            ),
        }
        Ok(outcome)
    }

    /// Records an approach that did not work, so later briefs steer around it.
    pub async fn record_dead_end(&self, input: NewDeadEnd) -> Result<DeadEnd> {
        if input.what.trim().is_empty() {
            return Err(AppError::validation("Dead end description is required"));
        }
        if input.why_failed.trim().is_empty() {
            return Err(AppError::validation("Dead end reason is required"));
        }
        if input.iterations_spent < 0 {
            return Err(AppError::validation("iterations_spent must not be negative"));
        }

        let tx = self.store.begin().await?;
        let outcome = dead_end_in(&tx, input).await;
        let dead_end = tx.finish(outcome).await?;

        info!(dead_end_id = %dead_end.dead_end_id, "dead end recorded");
        Ok(dead_end)
    }
}

async fn require_task_in_project(tx: &StoreConn<'_>, task_id: &str, project_id: &str) -> Result<Task> {
    let task = tx.require_task(task_id).await?;
    if task.project_id != project_id {
        return Err(AppError::validation(format!(
            "Task {} does not belong to project {}",
            task_id, project_id
        )));
    }
    Ok(task)
}

async fn submit_in(tx: &StoreConn<'_>, input: NewFinding, verify_priority: i32) -> Result<PendingFinding> {
    tx.require_project(&input.project_id).await?;
    let task = require_task_in_project(tx, &input.task_id, &input.project_id).await?;
    let submitter = tx.require_contributor(&input.user_id).await?;

    // Findings from a re-research fork continue its attempt count.
    let attempt = match &task.brief {
        TaskBrief::ReResearch(brief) => brief.attempt,
        _ => 1,
    };

    let now = now_millis();
    let mut pf = PendingFinding {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: input.project_id,
        finding_id: tx.allocate_id(&task.project_id, IdKind::PendingFinding).await?,
        title: input.title,
        confidence: input.confidence,
        source: input.source,
        implications: input.implications,
        submitted_by: submitter.id,
        submitted_by_task: task.id,
        attempt,
        verify_task_ids: Vec::with_capacity(QUORUM),
        votes: Vec::new(),
        status: PendingFindingStatus::PendingVerification,
        rejection_context: None,
        submitted_at: now,
        resolved_at: None,
    };

    let snapshot = PendingFindingSnapshot {
        pending_finding_ref: pf.id.clone(),
        finding_id: pf.finding_id.clone(),
        title: pf.title.clone(),
        confidence: pf.confidence,
        source: pf.source.clone(),
        implications: pf.implications.clone(),
        submitted_by: submitter.display_name,
    };

    for _ in 0..QUORUM {
        let verify = NewTask {
            project_id: pf.project_id.clone(),
            parent_id: None,
            priority: verify_priority,
            depends_on: Vec::new(),
            brief: TaskBrief::Verify(VerifyBrief {
                title: format!("Verify: {}", pf.title),
                description: VERIFY_DESCRIPTION.to_string(),
                pending_finding: snapshot.clone(),
            }),
        };
        let verify_task = create_task_in(tx, verify, now).await?;
        pf.verify_task_ids.push(verify_task.id);
    }

    tx.insert_pending_finding(&pf).await?;
    Ok(pf)
}

async fn vote_in(
    tx: &StoreConn<'_>,
    pending_finding_id: &str,
    verifier_id: &str,
    verdict: Verdict,
    notes: &str,
    fork_priority: i32,
) -> Result<VoteOutcome> {
    let mut pf = tx.require_pending_finding(pending_finding_id).await?;
    tx.require_contributor(verifier_id).await?;

    if pf.submitted_by == verifier_id {
        return Err(AppError::validation("Cannot verify your own finding"));
    }
    if pf.votes.iter().any(|v| v.verifier == verifier_id) {
        return Err(AppError::validation("Already voted on this finding"));
    }
    if pf.status != PendingFindingStatus::PendingVerification || pf.votes.len() >= QUORUM {
        return Err(AppError::validation(format!(
            "Verification of {} is closed ({})",
            pf.finding_id, pf.status
        )));
    }

    let now = now_millis();
    let vote = Vote {
        verifier: verifier_id.to_string(),
        verdict,
        notes: notes.to_string(),
        voted_at: now,
    };
    tx.insert_vote(&pf.id, &vote, pf.votes.len() as i64 + 1).await?;
    pf.votes.push(vote);

    if pf.votes.len() < QUORUM {
        return Ok(VoteOutcome::Recorded {
            votes_cast: pf.votes.len(),
        });
    }

    if pf.votes.iter().all(|v| v.verdict == Verdict::Pass) {
        let finding = promote(tx, &pf, now).await?;
        close_unclaimed_verify_tasks(tx, &pf, PendingFindingStatus::Verified, now).await?;
        return Ok(VoteOutcome::Verified { finding });
    }

    let failures: Vec<&Vote> = pf.votes.iter().filter(|v| v.verdict == Verdict::Fail).collect();
    let rejection_context = failures
        .iter()
        .map(|v| format!("Verifier rejected: {}", v.notes))
        .collect::<Vec<_>>()
        .join("\n\n");

    if !tx
        .resolve_pending_finding(&pf.id, PendingFindingStatus::Rejected, Some(&rejection_context), now)
        .await?
    {
        return Err(AppError::Conflict(format!("{} was decided concurrently", pf.finding_id)));
    }
    close_unclaimed_verify_tasks(tx, &pf, PendingFindingStatus::Rejected, now).await?;

    let fork = NewTask {
        project_id: pf.project_id.clone(),
        parent_id: Some(pf.submitted_by_task.clone()),
        priority: fork_priority,
        depends_on: Vec::new(),
        brief: TaskBrief::ReResearch(ReResearchBrief {
            title: format!("Re-research: {}", pf.title),
            description: RE_RESEARCH_DESCRIPTION.to_string(),
            pending_finding_ref: pf.id.clone(),
            previous_attempt_id: pf.finding_id.clone(),
            // verifier identities stay private to the fork
            rejection_reasons: failures
                .iter()
                .map(|v| VerificationFeedback {
                    verifier: "anonymous".to_string(),
                    verdict: v.verdict,
                    notes: v.notes.clone(),
                })
                .collect(),
            attempt: pf.attempt + 1,
        }),
    };
    let re_research_task = create_task_in(tx, fork, now).await?;

    Ok(VoteOutcome::Rejected {
        rejection_context,
        re_research_task,
    })
}

/// Retires sibling VERIFY tasks nobody claimed before the quorum vote.
async fn close_unclaimed_verify_tasks(
    tx: &StoreConn<'_>,
    pf: &PendingFinding,
    decided: PendingFindingStatus,
    now: i64,
) -> Result<()> {
    let reason = closed_verification_reason(&pf.finding_id, decided);
    for task_id in &pf.verify_task_ids {
        let Some(task) = tx.get_task(task_id).await? else {
            continue;
        };
        if task.status == TaskStatus::Pending && tx.close_verify_task(task_id, &reason, now).await? {
            debug!(task_id = %task_id, finding_id = %pf.finding_id, "unclaimed verify task closed");
        }
    }
    Ok(())
}

async fn promote(tx: &StoreConn<'_>, pf: &PendingFinding, now: i64) -> Result<Finding> {
    let finding = Finding {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: pf.project_id.clone(),
        finding_id: tx.allocate_id(&pf.project_id, IdKind::Finding).await?,
        title: pf.title.clone(),
        confidence: pf.confidence,
        source: pf.source.clone(),
        implications: pf.implications.clone(),
        summary_l0: Some(pf.title.clone()),
        summary_l1: Some(format!("{}. {}", pf.title, pf.implications)),
        created_by_task: pf.submitted_by_task.clone(),
        created_by: pf.submitted_by.clone(),
        created_at: now,
    };
    tx.insert_finding(&finding).await?;

    if !tx
        .resolve_pending_finding(&pf.id, PendingFindingStatus::Verified, None, now)
        .await?
    {
        return Err(AppError::Conflict(format!("{} was decided concurrently", pf.finding_id)));
    }
    Ok(finding)
}

async fn dead_end_in(tx: &StoreConn<'_>, input: NewDeadEnd) -> Result<DeadEnd> {
    tx.require_project(&input.project_id).await?;
    let task = require_task_in_project(tx, &input.task_id, &input.project_id).await?;

    let dead_end = DeadEnd {
        id: uuid::Uuid::new_v4().to_string(),
        dead_end_id: tx.allocate_id(&input.project_id, IdKind::DeadEnd).await?,
        project_id: input.project_id,
        what: input.what,
        why_failed: input.why_failed,
        iterations_spent: input.iterations_spent,
        lesson: input.lesson,
        created_by_task: task.id,
        created_at: now_millis(),
    };
    tx.insert_dead_end(&dead_end).await?;
    Ok(dead_end)
}
