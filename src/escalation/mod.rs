//! Escalation tickets.
//!
//! A ticket records work a worker cannot finish on its own: a GPU job, a
//! question for a scientist, access to a dataset. Tasks suspended on a ticket
//! become resumable once it is RESOLVED.

use crate::db::{now_millis, EntityStore, IdKind, StoreConn};
use crate::models::{NewTicket, Ticket, TicketStatus};
use crate::types::{AppError, Result};
use std::sync::Arc;
use tracing::info;

pub struct EscalationEngine {
    store: Arc<EntityStore>,
}

impl EscalationEngine {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Opens a ticket on behalf of a task. The project is taken from the task.
    pub async fn create_ticket(&self, input: NewTicket) -> Result<Ticket> {
        if input.question.trim().is_empty() {
            return Err(AppError::validation("Ticket question is required"));
        }

        let tx = self.store.begin().await?;
        let outcome = create_in(&tx, input).await;
        let ticket = tx.finish(outcome).await?;

        info!(
            ticket_id = %ticket.ticket_id,
            ticket_type = %ticket.ticket_type,
            priority = %ticket.priority,
            "ticket opened"
        );
        Ok(ticket)
    }

    /// OPEN -> CLAIMED.
    pub async fn claim_ticket(&self, id: &str, contributor_id: &str) -> Result<Ticket> {
        let tx = self.store.begin().await?;
        let outcome = claim_in(&tx, id, contributor_id).await;
        let ticket = tx.finish(outcome).await?;

        info!(ticket_id = %ticket.ticket_id, claimed_by = contributor_id, "ticket claimed");
        Ok(ticket)
    }

    /// OPEN or CLAIMED -> RESOLVED with a result.
    pub async fn resolve_ticket(
        &self,
        id: &str,
        result: &str,
        resolved_by: Option<&str>,
    ) -> Result<Ticket> {
        let tx = self.store.begin().await?;
        let outcome = transition_in(
            &tx,
            id,
            &[TicketStatus::Open, TicketStatus::Claimed],
            TicketStatus::Resolved,
            resolved_by,
            Some(result),
            Some(now_millis()),
        )
        .await;
        let ticket = tx.finish(outcome).await?;

        info!(ticket_id = %ticket.ticket_id, "ticket resolved");
        Ok(ticket)
    }

    /// OPEN or CLAIMED -> EXPIRED. Tasks suspended on it stay suspended.
    pub async fn expire_ticket(&self, id: &str) -> Result<Ticket> {
        let tx = self.store.begin().await?;
        let outcome = transition_in(
            &tx,
            id,
            &[TicketStatus::Open, TicketStatus::Claimed],
            TicketStatus::Expired,
            None,
            None,
            Some(now_millis()),
        )
        .await;
        let ticket = tx.finish(outcome).await?;

        info!(ticket_id = %ticket.ticket_id, "ticket expired");
        Ok(ticket)
    }

    /// OPEN tickets, most urgent first. With routing tags, only tickets that
    /// carry at least one of them.
    pub async fn open_tickets(
        &self,
        project_id: Option<&str>,
        routing_tags: &[String],
    ) -> Result<Vec<Ticket>> {
        let conn = self.store.read().await?;
        let tickets = conn.open_tickets(project_id).await?;
        Ok(filter_by_tags(tickets, routing_tags))
    }
}

fn filter_by_tags(tickets: Vec<Ticket>, routing_tags: &[String]) -> Vec<Ticket> {
    if routing_tags.is_empty() {
        return tickets;
    }
    tickets
        .into_iter()
        .filter(|t| routing_tags.iter().any(|tag| t.routing_tags.contains(tag)))
        .collect()
}

async fn create_in(tx: &StoreConn<'_>, input: NewTicket) -> Result<Ticket> {
    let task = tx.require_task(&input.task_id).await?;

    let ticket = Ticket {
        id: uuid::Uuid::new_v4().to_string(),
        ticket_id: tx.allocate_id(&task.project_id, IdKind::Job).await?,
        project_id: task.project_id,
        created_by_task: task.id,
        ticket_type: input.ticket_type,
        priority: input.priority,
        question: input.question,
        context: input.context,
        routing_tags: input.routing_tags,
        status: TicketStatus::Open,
        result: None,
        claimed_by: None,
        created_at: now_millis(),
        resolved_at: None,
    };
    tx.insert_ticket(&ticket).await?;
    Ok(ticket)
}

async fn claim_in(tx: &StoreConn<'_>, id: &str, contributor_id: &str) -> Result<Ticket> {
    tx.require_contributor(contributor_id).await?;
    transition_in(
        tx,
        id,
        &[TicketStatus::Open],
        TicketStatus::Claimed,
        Some(contributor_id),
        None,
        None,
    )
    .await
}

async fn transition_in(
    tx: &StoreConn<'_>,
    id: &str,
    from: &[TicketStatus],
    to: TicketStatus,
    claimed_by: Option<&str>,
    result: Option<&str>,
    resolved_at: Option<i64>,
) -> Result<Ticket> {
    let current = tx.require_ticket(id).await?;
    if !tx
        .transition_ticket(id, from, to, claimed_by, result, resolved_at)
        .await?
    {
        return Err(AppError::validation(format!(
            "Ticket {} is {} and cannot move to {}",
            current.ticket_id, current.status, to
        )));
    }
    tx.require_ticket(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TicketPriority, TicketType};

    fn ticket(tags: &[&str]) -> Ticket {
        Ticket {
            id: "t".to_string(),
            project_id: "p".to_string(),
            ticket_id: "JOB-001".to_string(),
            created_by_task: "task".to_string(),
            ticket_type: TicketType::GpuJob,
            priority: TicketPriority::Normal,
            question: "Run the fold".to_string(),
            context: String::new(),
            routing_tags: tags.iter().map(|t| t.to_string()).collect(),
            status: TicketStatus::Open,
            result: None,
            claimed_by: None,
            created_at: 0,
            resolved_at: None,
        }
    }

    #[test]
    fn test_no_tags_keeps_everything() {
        let tickets = vec![ticket(&["gpu"]), ticket(&[])];
        assert_eq!(filter_by_tags(tickets, &[]).len(), 2);
    }

    #[test]
    fn test_any_tag_matches() {
        let tickets = vec![ticket(&["gpu", "a100"]), ticket(&["wetlab"]), ticket(&[])];
        let wanted = vec!["a100".to_string(), "cpu".to_string()];
        let kept = filter_by_tags(tickets, &wanted);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].routing_tags, vec!["gpu", "a100"]);
    }
}
