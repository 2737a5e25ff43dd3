//! Pending findings, votes, verified findings, dead ends and hypotheses.

use super::store::{int, json, opt_int, opt_text, parsed, text, to_json, StoreConn};
use crate::models::{
    DeadEnd, Finding, Hypothesis, HypothesisStatus, PendingFinding, PendingFindingStatus, Vote,
};
use crate::types::{AppError, Result};
use libsql::Row;

const PENDING_FINDING_COLUMNS: &str = "id, project_id, finding_id, title, confidence, source,
     implications, submitted_by, submitted_by_task, attempt, verify_task_ids, status,
     rejection_context, submitted_at, resolved_at";

const FINDING_COLUMNS: &str = "id, project_id, finding_id, title, confidence, source,
     implications, summary_l0, summary_l1, created_by_task, created_by, created_at";

const DEAD_END_COLUMNS: &str = "id, project_id, dead_end_id, what, why_failed, iterations_spent,
     lesson, created_by_task, created_at";

const HYPOTHESIS_COLUMNS: &str = "id, project_id, hypothesis_id, statement, rationale, test_plan,
     based_on, status, test_task_id, result, created_by_task, created_by, created_at, resolved_at";

/// Decodes everything but the votes, which live in their own table.
fn pending_finding_from_row(row: &Row) -> Result<PendingFinding> {
    Ok(PendingFinding {
        id: text(row, 0)?,
        project_id: text(row, 1)?,
        finding_id: text(row, 2)?,
        title: text(row, 3)?,
        confidence: parsed(row, 4)?,
        source: text(row, 5)?,
        implications: text(row, 6)?,
        submitted_by: text(row, 7)?,
        submitted_by_task: text(row, 8)?,
        attempt: int(row, 9)?,
        verify_task_ids: json(row, 10)?,
        votes: Vec::new(),
        status: parsed(row, 11)?,
        rejection_context: opt_text(row, 12)?,
        submitted_at: int(row, 13)?,
        resolved_at: opt_int(row, 14)?,
    })
}

fn vote_from_row(row: &Row) -> Result<Vote> {
    Ok(Vote {
        verifier: text(row, 0)?,
        verdict: parsed(row, 1)?,
        notes: text(row, 2)?,
        voted_at: int(row, 3)?,
    })
}

fn finding_from_row(row: &Row) -> Result<Finding> {
    Ok(Finding {
        id: text(row, 0)?,
        project_id: text(row, 1)?,
        finding_id: text(row, 2)?,
        title: text(row, 3)?,
        confidence: parsed(row, 4)?,
        source: text(row, 5)?,
        implications: text(row, 6)?,
        summary_l0: opt_text(row, 7)?,
        summary_l1: opt_text(row, 8)?,
        created_by_task: text(row, 9)?,
        created_by: text(row, 10)?,
        created_at: int(row, 11)?,
    })
}

fn dead_end_from_row(row: &Row) -> Result<DeadEnd> {
    Ok(DeadEnd {
        id: text(row, 0)?,
        project_id: text(row, 1)?,
        dead_end_id: text(row, 2)?,
        what: text(row, 3)?,
        why_failed: text(row, 4)?,
        iterations_spent: int(row, 5)?,
        lesson: text(row, 6)?,
        created_by_task: text(row, 7)?,
        created_at: int(row, 8)?,
    })
}

fn hypothesis_from_row(row: &Row) -> Result<Hypothesis> {
    Ok(Hypothesis {
        id: text(row, 0)?,
        project_id: text(row, 1)?,
        hypothesis_id: text(row, 2)?,
        statement: text(row, 3)?,
        rationale: text(row, 4)?,
        test_plan: text(row, 5)?,
        based_on: json(row, 6)?,
        status: parsed(row, 7)?,
        test_task_id: opt_text(row, 8)?,
        result: opt_text(row, 9)?,
        created_by_task: text(row, 10)?,
        created_by: text(row, 11)?,
        created_at: int(row, 12)?,
        resolved_at: opt_int(row, 13)?,
    })
}

impl StoreConn<'_> {
    // ============== Pending findings ==============

    pub async fn insert_pending_finding(&self, pf: &PendingFinding) -> Result<()> {
        self.execute(
            "INSERT INTO pending_findings (id, project_id, finding_id, title, confidence, source,
                 implications, submitted_by, submitted_by_task, attempt, verify_task_ids, status,
                 rejection_context, submitted_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                pf.id.as_str(),
                pf.project_id.as_str(),
                pf.finding_id.as_str(),
                pf.title.as_str(),
                pf.confidence.as_str(),
                pf.source.as_str(),
                pf.implications.as_str(),
                pf.submitted_by.as_str(),
                pf.submitted_by_task.as_str(),
                pf.attempt,
                to_json(&pf.verify_task_ids)?,
                pf.status.as_str(),
                pf.rejection_context.clone(),
                pf.submitted_at,
                pf.resolved_at,
            ],
        )
        .await?;
        Ok(())
    }

    /// Loads a pending finding with its votes in cast order.
    pub async fn get_pending_finding(&self, id: &str) -> Result<Option<PendingFinding>> {
        let sql = format!(
            "SELECT {} FROM pending_findings WHERE id = ?",
            PENDING_FINDING_COLUMNS
        );
        let Some(mut pf) = self.query_opt(&sql, [id], pending_finding_from_row).await? else {
            return Ok(None);
        };
        pf.votes = self.votes_for(id).await?;
        Ok(Some(pf))
    }

    pub async fn require_pending_finding(&self, id: &str) -> Result<PendingFinding> {
        self.get_pending_finding(id)
            .await?
            .ok_or_else(|| AppError::not_found("pending finding", id))
    }

    pub async fn pending_findings(
        &self,
        project_id: &str,
        status: Option<PendingFindingStatus>,
    ) -> Result<Vec<PendingFinding>> {
        let mut findings = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM pending_findings WHERE project_id = ? AND status = ?
                     ORDER BY submitted_at DESC, rowid DESC",
                    PENDING_FINDING_COLUMNS
                );
                self.query_all(&sql, (project_id, status.as_str()), pending_finding_from_row)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM pending_findings WHERE project_id = ?
                     ORDER BY submitted_at DESC, rowid DESC",
                    PENDING_FINDING_COLUMNS
                );
                self.query_all(&sql, [project_id], pending_finding_from_row)
                    .await?
            }
        };

        for pf in &mut findings {
            pf.votes = self.votes_for(&pf.id).await?;
        }
        Ok(findings)
    }

    async fn votes_for(&self, pending_finding_id: &str) -> Result<Vec<Vote>> {
        self.query_all(
            "SELECT verifier, verdict, notes, voted_at FROM verification_votes
             WHERE pending_finding_id = ? ORDER BY position ASC",
            [pending_finding_id],
            vote_from_row,
        )
        .await
    }

    pub async fn insert_vote(&self, pending_finding_id: &str, vote: &Vote, position: i64) -> Result<()> {
        self.execute(
            "INSERT INTO verification_votes (pending_finding_id, verifier, verdict, notes, position, voted_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                pending_finding_id,
                vote.verifier.as_str(),
                vote.verdict.as_str(),
                vote.notes.as_str(),
                position,
                vote.voted_at,
            ),
        )
        .await
        .map_err(|e| match e {
            AppError::Database(msg) if msg.contains("UNIQUE") => {
                AppError::Conflict(format!("duplicate vote on {}", pending_finding_id))
            }
            other => other,
        })?;
        Ok(())
    }

    /// Records the quorum outcome. Only a PENDING_VERIFICATION row moves.
    pub async fn resolve_pending_finding(
        &self,
        id: &str,
        status: PendingFindingStatus,
        rejection_context: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE pending_findings SET status = ?, rejection_context = ?, resolved_at = ?
                 WHERE id = ? AND status = 'PENDING_VERIFICATION'",
                (status.as_str(), rejection_context, now, id),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn transition_pending_finding(
        &self,
        id: &str,
        from: PendingFindingStatus,
        to: PendingFindingStatus,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE pending_findings SET status = ? WHERE id = ? AND status = ?",
                (to.as_str(), id, from.as_str()),
            )
            .await?;
        Ok(changed > 0)
    }

    // ============== Findings ==============

    pub async fn insert_finding(&self, finding: &Finding) -> Result<()> {
        self.execute(
            "INSERT INTO findings (id, project_id, finding_id, title, confidence, source,
                 implications, summary_l0, summary_l1, created_by_task, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                finding.id.as_str(),
                finding.project_id.as_str(),
                finding.finding_id.as_str(),
                finding.title.as_str(),
                finding.confidence.as_str(),
                finding.source.as_str(),
                finding.implications.as_str(),
                finding.summary_l0.clone(),
                finding.summary_l1.clone(),
                finding.created_by_task.as_str(),
                finding.created_by.as_str(),
                finding.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    /// Verified findings of a project, newest first.
    pub async fn findings_newest_first(&self, project_id: &str) -> Result<Vec<Finding>> {
        let sql = format!(
            "SELECT {} FROM findings WHERE project_id = ?
             ORDER BY created_at DESC, rowid DESC",
            FINDING_COLUMNS
        );
        self.query_all(&sql, [project_id], finding_from_row).await
    }

    /// The `limit` newest findings, across all projects unless one is given.
    pub async fn recent_findings(&self, project_id: Option<&str>, limit: usize) -> Result<Vec<Finding>> {
        let limit = limit as i64;
        match project_id {
            Some(project_id) => {
                let sql = format!(
                    "SELECT {} FROM findings WHERE project_id = ?
                     ORDER BY created_at DESC, rowid DESC LIMIT ?",
                    FINDING_COLUMNS
                );
                self.query_all(&sql, (project_id, limit), finding_from_row)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM findings ORDER BY created_at DESC, rowid DESC LIMIT ?",
                    FINDING_COLUMNS
                );
                self.query_all(&sql, [limit], finding_from_row).await
            }
        }
    }

    pub async fn get_finding_by_human_id(
        &self,
        project_id: &str,
        finding_id: &str,
    ) -> Result<Option<Finding>> {
        let sql = format!(
            "SELECT {} FROM findings WHERE project_id = ? AND finding_id = ?",
            FINDING_COLUMNS
        );
        self.query_opt(&sql, (project_id, finding_id), finding_from_row)
            .await
    }

    pub async fn count_findings(&self, project_id: Option<&str>) -> Result<i64> {
        match project_id {
            Some(project_id) => {
                self.query_count(
                    "SELECT COUNT(*) FROM findings WHERE project_id = ?",
                    [project_id],
                )
                .await
            }
            None => self.query_count("SELECT COUNT(*) FROM findings", ()).await,
        }
    }

    // ============== Dead ends ==============

    pub async fn insert_dead_end(&self, dead_end: &DeadEnd) -> Result<()> {
        self.execute(
            "INSERT INTO dead_ends (id, project_id, dead_end_id, what, why_failed,
                 iterations_spent, lesson, created_by_task, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                dead_end.id.as_str(),
                dead_end.project_id.as_str(),
                dead_end.dead_end_id.as_str(),
                dead_end.what.as_str(),
                dead_end.why_failed.as_str(),
                dead_end.iterations_spent,
                dead_end.lesson.as_str(),
                dead_end.created_by_task.as_str(),
                dead_end.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    /// Dead ends of a project, most recent first, at most `limit` when given.
    pub async fn dead_ends(&self, project_id: &str, limit: Option<usize>) -> Result<Vec<DeadEnd>> {
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM dead_ends WHERE project_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
            DEAD_END_COLUMNS
        );
        self.query_all(&sql, (project_id, limit), dead_end_from_row)
            .await
    }

    // ============== Hypotheses ==============

    pub async fn insert_hypothesis(&self, hypothesis: &Hypothesis) -> Result<()> {
        self.execute(
            "INSERT INTO hypotheses (id, project_id, hypothesis_id, statement, rationale, test_plan,
                 based_on, status, test_task_id, result, created_by_task, created_by, created_at,
                 resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                hypothesis.id.as_str(),
                hypothesis.project_id.as_str(),
                hypothesis.hypothesis_id.as_str(),
                hypothesis.statement.as_str(),
                hypothesis.rationale.as_str(),
                hypothesis.test_plan.as_str(),
                to_json(&hypothesis.based_on)?,
                hypothesis.status.as_str(),
                hypothesis.test_task_id.clone(),
                hypothesis.result.clone(),
                hypothesis.created_by_task.as_str(),
                hypothesis.created_by.as_str(),
                hypothesis.created_at,
                hypothesis.resolved_at,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>> {
        let sql = format!("SELECT {} FROM hypotheses WHERE id = ?", HYPOTHESIS_COLUMNS);
        self.query_opt(&sql, [id], hypothesis_from_row).await
    }

    pub async fn require_hypothesis(&self, id: &str) -> Result<Hypothesis> {
        self.get_hypothesis(id)
            .await?
            .ok_or_else(|| AppError::not_found("hypothesis", id))
    }

    pub async fn hypotheses(
        &self,
        project_id: &str,
        status: Option<HypothesisStatus>,
    ) -> Result<Vec<Hypothesis>> {
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM hypotheses WHERE project_id = ? AND status = ?
                     ORDER BY created_at DESC, rowid DESC",
                    HYPOTHESIS_COLUMNS
                );
                self.query_all(&sql, (project_id, status.as_str()), hypothesis_from_row)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM hypotheses WHERE project_id = ?
                     ORDER BY created_at DESC, rowid DESC",
                    HYPOTHESIS_COLUMNS
                );
                self.query_all(&sql, [project_id], hypothesis_from_row)
                    .await
            }
        }
    }

    /// Hypotheses that still block duplicates: everything except ABANDONED.
    pub async fn live_hypotheses(&self, project_id: &str) -> Result<Vec<Hypothesis>> {
        let sql = format!(
            "SELECT {} FROM hypotheses WHERE project_id = ? AND status != 'ABANDONED'
             ORDER BY created_at ASC, rowid ASC",
            HYPOTHESIS_COLUMNS
        );
        self.query_all(&sql, [project_id], hypothesis_from_row).await
    }

    pub async fn start_hypothesis_test(&self, id: &str, test_task_id: &str) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE hypotheses SET test_task_id = ?, status = 'TESTING'
                 WHERE id = ? AND status = 'PROPOSED'",
                (test_task_id, id),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn set_hypothesis_outcome(
        &self,
        id: &str,
        status: HypothesisStatus,
        result: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE hypotheses SET status = ?, result = ?, resolved_at = ? WHERE id = ?",
                (status.as_str(), result, now, id),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn count_hypotheses_by_status(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<(HypothesisStatus, i64)>> {
        fn decode(row: &Row) -> Result<(HypothesisStatus, i64)> {
            Ok((parsed(row, 0)?, int(row, 1)?))
        }

        match project_id {
            Some(project_id) => {
                self.query_all(
                    "SELECT status, COUNT(*) FROM hypotheses WHERE project_id = ? GROUP BY status",
                    [project_id],
                    decode,
                )
                .await
            }
            None => {
                self.query_all(
                    "SELECT status, COUNT(*) FROM hypotheses GROUP BY status",
                    (),
                    decode,
                )
                .await
            }
        }
    }
}
