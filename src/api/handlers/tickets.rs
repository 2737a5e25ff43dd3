//! Escalation tickets and the per-task lab notebook.

use crate::{
    models::{NewTicket, NotebookEntry, NotebookEntryType, Ticket},
    types::Result,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

/// Query of `GET /api/tickets`. `tags` is a comma-separated list; a ticket
/// matches when it carries any of them.
#[derive(Debug, Default, Deserialize)]
pub struct TicketFilter {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

impl TicketFilter {
    fn tags(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaimTicketRequest {
    pub contributor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveTicketRequest {
    pub result: String,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendEntryRequest {
    #[serde(default)]
    pub contributor_id: Option<String>,
    pub entry_type: NotebookEntryType,
    pub content: String,
}

pub async fn open_tickets(
    State(state): State<AppState>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>> {
    let tickets = state
        .escalation
        .open_tickets(filter.project_id.as_deref(), &filter.tags())
        .await?;
    Ok(Json(tickets))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Json(payload): Json<NewTicket>,
) -> Result<Json<Ticket>> {
    Ok(Json(state.escalation.create_ticket(payload).await?))
}

pub async fn claim_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ClaimTicketRequest>,
) -> Result<Json<Ticket>> {
    let ticket = state
        .escalation
        .claim_ticket(&id, &payload.contributor_id)
        .await?;
    Ok(Json(ticket))
}

pub async fn resolve_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ResolveTicketRequest>,
) -> Result<Json<Ticket>> {
    let ticket = state
        .escalation
        .resolve_ticket(&id, &payload.result, payload.resolved_by.as_deref())
        .await?;
    Ok(Json(ticket))
}

pub async fn expire_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>> {
    Ok(Json(state.escalation.expire_ticket(&id).await?))
}

pub async fn notebook(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<NotebookEntry>>> {
    Ok(Json(state.notebook.entries(&task_id).await?))
}

pub async fn append_notebook_entry(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(payload): Json<AppendEntryRequest>,
) -> Result<Json<NotebookEntry>> {
    let entry = state
        .notebook
        .append(
            &task_id,
            payload.contributor_id.as_deref(),
            payload.entry_type,
            &payload.content,
        )
        .await?;
    Ok(Json(entry))
}
