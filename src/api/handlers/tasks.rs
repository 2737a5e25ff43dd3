//! Task lifecycle handlers: create, claim, complete, fail, suspend, resume
//! and lease upkeep.

use crate::{
    models::{NewTask, Task, TaskBrief},
    types::Result,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/tasks`. The priority defaults to
/// `scheduler.research_priority`.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub brief: TaskBrief,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub contributor_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// `task` is `null` when nothing is eligible.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub task: Option<Task>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub contributor_id: String,
    pub result: String,
    #[serde(default)]
    pub tokens_used: i64,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub contributor_id: String,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub contributor_id: String,
    pub ticket_id: String,
    #[serde(default)]
    pub snapshot: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub contributor_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub lease_expires_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReclaimResponse {
    pub reclaimed: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectFilter {
    #[serde(default)]
    pub project_id: Option<String>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<Json<Task>> {
    let priority = payload
        .priority
        .unwrap_or_else(|| state.config_manager.config().scheduler.research_priority);
    let task = state
        .scheduler
        .create_task(NewTask {
            project_id: payload.project_id,
            parent_id: payload.parent_id,
            priority,
            depends_on: payload.depends_on,
            brief: payload.brief,
        })
        .await?;
    Ok(Json(task))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    Ok(Json(state.queries.task(&id).await?))
}

/// PENDING tasks in claim order, optionally for one project.
pub async fn available_tasks(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<Task>>> {
    let tasks = state
        .queries
        .available_tasks(filter.project_id.as_deref())
        .await?;
    Ok(Json(tasks))
}

/// Claims the next eligible task for the caller.
pub async fn claim_task(
    State(state): State<AppState>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>> {
    let task = state
        .scheduler
        .claim_task(&payload.contributor_id, payload.project_id.as_deref())
        .await?;
    Ok(Json(ClaimResponse { task }))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<Task>> {
    let task = state
        .scheduler
        .complete_task(&id, &payload.contributor_id, &payload.result, payload.tokens_used)
        .await?;
    Ok(Json(task))
}

pub async fn fail_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<FailRequest>,
) -> Result<Json<Task>> {
    let task = state
        .scheduler
        .fail_task(&id, &payload.contributor_id, &payload.error)
        .await?;
    Ok(Json(task))
}

pub async fn suspend_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SuspendRequest>,
) -> Result<Json<Task>> {
    let task = state
        .scheduler
        .suspend_task(&id, &payload.contributor_id, &payload.ticket_id, payload.snapshot)
        .await?;
    Ok(Json(task))
}

pub async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    Ok(Json(state.scheduler.resume_task(&id).await?))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>> {
    let lease_expires_at = state
        .scheduler
        .heartbeat(&id, &payload.contributor_id)
        .await?;
    Ok(Json(HeartbeatResponse { lease_expires_at }))
}

/// Returns every task with an expired lease to the backlog.
pub async fn reclaim_expired(State(state): State<AppState>) -> Result<Json<ReclaimResponse>> {
    let reclaimed = state.scheduler.reclaim_expired().await?;
    Ok(Json(ReclaimResponse { reclaimed }))
}

/// SUSPENDED tasks of a contributor whose ticket is resolved.
pub async fn resumable_tasks(
    State(state): State<AppState>,
    Path(contributor_id): Path<String>,
) -> Result<Json<Vec<Task>>> {
    Ok(Json(state.scheduler.resumable_tasks(&contributor_id).await?))
}
