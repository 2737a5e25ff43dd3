//! Task rows.
//!
//! Every state transition is a conditional `UPDATE ... WHERE status = ?` and
//! reports whether it matched, so callers inside a transaction can tell a lost
//! race from a successful write.

use super::store::{int, json, opt_int, opt_json, opt_text, parsed, text, to_json, StoreConn};
use crate::models::{AssembledContext, SavedState, Task, TaskStatus};
use crate::types::{AppError, Result};
use libsql::Row;
use std::collections::HashMap;

const TASK_COLUMNS: &str = "id, project_id, parent_id, task_type, priority, status, depends_on,
     assigned_to, brief, context, context_markdown, result, saved_state, claimed_at,
     lease_expires_at, created_at, completed_at";

fn task_from_row(row: &Row) -> Result<Task> {
    Ok(Task {
        id: text(row, 0)?,
        project_id: text(row, 1)?,
        parent_id: opt_text(row, 2)?,
        task_type: parsed(row, 3)?,
        priority: int(row, 4)? as i32,
        status: parsed(row, 5)?,
        depends_on: json(row, 6)?,
        assigned_to: opt_text(row, 7)?,
        brief: json(row, 8)?,
        context: opt_json(row, 9)?,
        context_markdown: opt_text(row, 10)?,
        result: opt_text(row, 11)?,
        saved_state: opt_json(row, 12)?,
        claimed_at: opt_int(row, 13)?,
        lease_expires_at: opt_int(row, 14)?,
        created_at: int(row, 15)?,
        completed_at: opt_int(row, 16)?,
    })
}

/// Status and edges of one task, enough for gating and cycle detection.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
}

impl StoreConn<'_> {
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let context = match &task.context {
            Some(ctx) => Some(to_json(ctx)?),
            None => None,
        };
        let saved_state = match &task.saved_state {
            Some(state) => Some(to_json(state)?),
            None => None,
        };

        self.execute(
            "INSERT INTO tasks (id, project_id, parent_id, task_type, priority, status, depends_on,
                 assigned_to, brief, context, context_markdown, result, saved_state, claimed_at,
                 lease_expires_at, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                task.id.as_str(),
                task.project_id.as_str(),
                task.parent_id.clone(),
                task.task_type.as_str(),
                task.priority as i64,
                task.status.as_str(),
                to_json(&task.depends_on)?,
                task.assigned_to.clone(),
                to_json(&task.brief)?,
                context,
                task.context_markdown.clone(),
                task.result.clone(),
                saved_state,
                task.claimed_at,
                task.lease_expires_at,
                task.created_at,
                task.completed_at,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        self.query_opt(&sql, [id], task_from_row).await
    }

    pub async fn require_task(&self, id: &str) -> Result<Task> {
        self.get_task(id)
            .await?
            .ok_or_else(|| AppError::not_found("task", id))
    }

    /// PENDING tasks in claim order: priority, then creation time, then
    /// insertion order.
    pub async fn pending_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>> {
        match project_id {
            Some(project_id) => {
                let sql = format!(
                    "SELECT {} FROM tasks WHERE status = 'PENDING' AND project_id = ?
                     ORDER BY priority ASC, created_at ASC, rowid ASC",
                    TASK_COLUMNS
                );
                self.query_all(&sql, [project_id], task_from_row).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM tasks WHERE status = 'PENDING'
                     ORDER BY priority ASC, created_at ASC, rowid ASC",
                    TASK_COLUMNS
                );
                self.query_all(&sql, (), task_from_row).await
            }
        }
    }

    pub async fn tasks_by_status(
        &self,
        project_id: &str,
        status: TaskStatus,
    ) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE project_id = ? AND status = ?
             ORDER BY priority ASC, created_at ASC, rowid ASC",
            TASK_COLUMNS
        );
        self.query_all(&sql, (project_id, status.as_str()), task_from_row)
            .await
    }

    pub async fn project_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE project_id = ? ORDER BY created_at ASC, rowid ASC",
            TASK_COLUMNS
        );
        self.query_all(&sql, [project_id], task_from_row).await
    }

    /// Status and dependency edges of every task.
    pub async fn task_graph(&self) -> Result<HashMap<String, TaskNode>> {
        let entries = self
            .query_all("SELECT id, status, depends_on FROM tasks", (), |row| {
                Ok((
                    text(row, 0)?,
                    TaskNode {
                        status: parsed(row, 1)?,
                        depends_on: json(row, 2)?,
                    },
                ))
            })
            .await?;
        Ok(entries.into_iter().collect())
    }

    pub async fn count_tasks_by_status(
        &self,
        project_id: Option<&str>,
    ) -> Result<HashMap<TaskStatus, i64>> {
        fn decode(row: &Row) -> Result<(TaskStatus, i64)> {
            Ok((parsed(row, 0)?, int(row, 1)?))
        }

        let counts = match project_id {
            Some(project_id) => {
                self.query_all(
                    "SELECT status, COUNT(*) FROM tasks WHERE project_id = ? GROUP BY status",
                    [project_id],
                    decode,
                )
                .await?
            }
            None => {
                self.query_all(
                    "SELECT status, COUNT(*) FROM tasks GROUP BY status",
                    (),
                    decode,
                )
                .await?
            }
        };
        Ok(counts.into_iter().collect())
    }

    /// PENDING -> ASSIGNED. The context and its rendering are only written if
    /// absent, so a re-claimed task keeps the brief of its first claim.
    pub async fn mark_task_assigned(
        &self,
        id: &str,
        assignee: &str,
        context: &AssembledContext,
        context_markdown: &str,
        claimed_at: i64,
        lease_expires_at: Option<i64>,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'ASSIGNED',
                     assigned_to = ?,
                     context = COALESCE(context, ?),
                     context_markdown = COALESCE(context_markdown, ?),
                     claimed_at = ?,
                     lease_expires_at = ?
                 WHERE id = ? AND status = 'PENDING'",
                libsql::params![
                    assignee,
                    to_json(context)?,
                    context_markdown,
                    claimed_at,
                    lease_expires_at,
                    id,
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    /// ASSIGNED -> COMPLETED, only while `assignee` still holds the task.
    pub async fn mark_task_completed(
        &self,
        id: &str,
        assignee: &str,
        result: &str,
        now: i64,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'COMPLETED', result = ?, completed_at = ?, lease_expires_at = NULL
                 WHERE id = ? AND status = 'ASSIGNED' AND assigned_to = ?",
                (result, now, id, assignee),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn mark_task_failed(
        &self,
        id: &str,
        assignee: &str,
        result: &str,
        now: i64,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'FAILED', result = ?, completed_at = ?, lease_expires_at = NULL
                 WHERE id = ? AND status = 'ASSIGNED' AND assigned_to = ?",
                (result, now, id, assignee),
            )
            .await?;
        Ok(changed > 0)
    }

    /// Retires a VERIFY task whose finding was decided without it. Applies to
    /// PENDING tasks and to ASSIGNED ones whose lease ran out.
    pub async fn close_verify_task(&self, id: &str, result: &str, now: i64) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'FAILED', result = ?, completed_at = ?, lease_expires_at = NULL
                 WHERE id = ? AND task_type = 'VERIFY' AND status IN ('PENDING', 'ASSIGNED')",
                (result, now, id),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn mark_task_suspended(
        &self,
        id: &str,
        assignee: &str,
        state: &SavedState,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'SUSPENDED', saved_state = ?, lease_expires_at = NULL
                 WHERE id = ? AND status = 'ASSIGNED' AND assigned_to = ?",
                (to_json(state)?, id, assignee),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn mark_task_resumed(
        &self,
        id: &str,
        now: i64,
        lease_expires_at: Option<i64>,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'ASSIGNED', saved_state = NULL, claimed_at = ?, lease_expires_at = ?
                 WHERE id = ? AND status = 'SUSPENDED'",
                (now, lease_expires_at, id),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn extend_task_lease(
        &self,
        id: &str,
        assignee: &str,
        lease_expires_at: i64,
    ) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks SET lease_expires_at = ?
                 WHERE id = ? AND assigned_to = ? AND status = 'ASSIGNED'",
                (lease_expires_at, id, assignee),
            )
            .await?;
        Ok(changed > 0)
    }

    /// ASSIGNED tasks whose lease ran out before `now`.
    pub async fn expired_assignments(&self, now: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks
             WHERE status = 'ASSIGNED' AND lease_expires_at IS NOT NULL AND lease_expires_at < ?
             ORDER BY lease_expires_at ASC, rowid ASC",
            TASK_COLUMNS
        );
        self.query_all(&sql, [now], task_from_row).await
    }

    /// ASSIGNED -> PENDING for an expired lease. Context stays in place.
    pub async fn release_task(&self, id: &str, now: i64) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks
                 SET status = 'PENDING', assigned_to = NULL, claimed_at = NULL, lease_expires_at = NULL
                 WHERE id = ? AND status = 'ASSIGNED'
                   AND lease_expires_at IS NOT NULL AND lease_expires_at < ?",
                (id, now),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn mark_task_blocked(&self, id: &str) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE tasks SET status = 'BLOCKED' WHERE id = ? AND status = 'PENDING'",
                [id],
            )
            .await?;
        Ok(changed > 0)
    }

    /// SUSPENDED tasks held by `contributor_id`.
    pub async fn suspended_tasks_for(&self, contributor_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE status = 'SUSPENDED' AND assigned_to = ?
             ORDER BY priority ASC, created_at ASC, rowid ASC",
            TASK_COLUMNS
        );
        self.query_all(&sql, [contributor_id], task_from_row).await
    }
}
