//! Escalation tickets and lab notebook entries.

use super::store::{int, json, opt_int, opt_text, parsed, text, to_json, StoreConn};
use crate::models::{NotebookEntry, Ticket, TicketStatus};
use crate::types::{AppError, Result};
use libsql::Row;

const TICKET_COLUMNS: &str = "id, project_id, ticket_id, created_by_task, ticket_type, priority,
     question, context, routing_tags, status, result, claimed_by, created_at, resolved_at";

fn ticket_from_row(row: &Row) -> Result<Ticket> {
    Ok(Ticket {
        id: text(row, 0)?,
        project_id: text(row, 1)?,
        ticket_id: text(row, 2)?,
        created_by_task: text(row, 3)?,
        ticket_type: parsed(row, 4)?,
        priority: parsed(row, 5)?,
        question: text(row, 6)?,
        context: text(row, 7)?,
        routing_tags: json(row, 8)?,
        status: parsed(row, 9)?,
        result: opt_text(row, 10)?,
        claimed_by: opt_text(row, 11)?,
        created_at: int(row, 12)?,
        resolved_at: opt_int(row, 13)?,
    })
}

fn entry_from_row(row: &Row) -> Result<NotebookEntry> {
    Ok(NotebookEntry {
        task_id: text(row, 0)?,
        project_id: text(row, 1)?,
        contributor_id: opt_text(row, 2)?,
        entry_type: parsed(row, 3)?,
        content: text(row, 4)?,
        recorded_at: int(row, 5)?,
    })
}

impl StoreConn<'_> {
    // ============== Tickets ==============

    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        self.execute(
            "INSERT INTO tickets (id, project_id, ticket_id, created_by_task, ticket_type, priority,
                 question, context, routing_tags, status, result, claimed_by, created_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                ticket.id.as_str(),
                ticket.project_id.as_str(),
                ticket.ticket_id.as_str(),
                ticket.created_by_task.as_str(),
                ticket.ticket_type.as_str(),
                ticket.priority.as_str(),
                ticket.question.as_str(),
                ticket.context.as_str(),
                to_json(&ticket.routing_tags)?,
                ticket.status.as_str(),
                ticket.result.clone(),
                ticket.claimed_by.clone(),
                ticket.created_at,
                ticket.resolved_at,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_ticket(&self, id: &str) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS);
        self.query_opt(&sql, [id], ticket_from_row).await
    }

    pub async fn require_ticket(&self, id: &str) -> Result<Ticket> {
        self.get_ticket(id)
            .await?
            .ok_or_else(|| AppError::not_found("ticket", id))
    }

    /// OPEN tickets, most urgent first.
    pub async fn open_tickets(&self, project_id: Option<&str>) -> Result<Vec<Ticket>> {
        let order = "ORDER BY CASE priority WHEN 'URGENT' THEN 0 WHEN 'HIGH' THEN 1 ELSE 2 END,
                     created_at ASC, rowid ASC";
        match project_id {
            Some(project_id) => {
                let sql = format!(
                    "SELECT {} FROM tickets WHERE status = 'OPEN' AND project_id = ? {}",
                    TICKET_COLUMNS, order
                );
                self.query_all(&sql, [project_id], ticket_from_row).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM tickets WHERE status = 'OPEN' {}",
                    TICKET_COLUMNS, order
                );
                self.query_all(&sql, (), ticket_from_row).await
            }
        }
    }

    /// Moves a ticket from `from` to `to`, optionally recording claimant,
    /// result and resolution time. Returns whether the row matched.
    pub async fn transition_ticket(
        &self,
        id: &str,
        from: &[TicketStatus],
        to: TicketStatus,
        claimed_by: Option<&str>,
        result: Option<&str>,
        resolved_at: Option<i64>,
    ) -> Result<bool> {
        let allowed = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE tickets
             SET status = ?,
                 claimed_by = COALESCE(?, claimed_by),
                 result = COALESCE(?, result),
                 resolved_at = COALESCE(?, resolved_at)
             WHERE id = ? AND status IN ({})",
            allowed
        );
        let changed = self
            .execute(&sql, (to.as_str(), claimed_by, result, resolved_at, id))
            .await?;
        Ok(changed > 0)
    }

    // ============== Lab notebook ==============

    pub async fn insert_notebook_entry(&self, entry: &NotebookEntry) -> Result<()> {
        self.execute(
            "INSERT INTO notebook_entries (task_id, project_id, contributor_id, entry_type, content, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                entry.task_id.as_str(),
                entry.project_id.as_str(),
                entry.contributor_id.clone(),
                entry.entry_type.as_str(),
                entry.content.as_str(),
                entry.recorded_at,
            ),
        )
        .await?;
        Ok(())
    }

    pub async fn notebook_for_task(&self, task_id: &str) -> Result<Vec<NotebookEntry>> {
        self.query_all(
            "SELECT task_id, project_id, contributor_id, entry_type, content, recorded_at
             FROM notebook_entries WHERE task_id = ? ORDER BY id ASC",
            [task_id],
            entry_from_row,
        )
        .await
    }
}
