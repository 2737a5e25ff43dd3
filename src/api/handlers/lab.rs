//! Projects, contributors, dashboard stats and the per-project listings.

use crate::{
    models::{
        Contributor, DeadEnd, Finding, Hypothesis, HypothesisStatus, NewContributor, NewProject,
        PendingFinding, PendingFindingStatus, Project, ProjectStatus,
    },
    queries::{DashboardStats, FindingExpansion, TaskTreeNode},
    types::{AppError, Result},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectStatusRequest {
    pub status: ProjectStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingFindingFilter {
    #[serde(default)]
    pub status: Option<PendingFindingStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HypothesisFilter {
    #[serde(default)]
    pub status: Option<HypothesisStatus>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Aggregate counts for the lab, or for one project with `?project_id=`.
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<DashboardStats>> {
    let stats = state
        .queries
        .dashboard_stats(query.project_id.as_deref())
        .await?;
    Ok(Json(stats))
}

// ============= Projects =============

pub async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>> {
    Ok(Json(state.queries.projects().await?))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(payload): Json<NewProject>,
) -> Result<Json<Project>> {
    Ok(Json(state.registry.create_project(payload).await?))
}

pub async fn project_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Project>> {
    Ok(Json(state.queries.project_by_slug(&slug).await?))
}

pub async fn set_project_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ProjectStatusRequest>,
) -> Result<Json<Project>> {
    let project = state
        .registry
        .set_project_status(&id, payload.status)
        .await?;
    Ok(Json(project))
}

pub async fn findings(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<Finding>>> {
    Ok(Json(state.queries.findings(&project_id).await?))
}

/// Full detail of one finding by its `F-nnn` identifier.
pub async fn expand_finding(
    State(state): State<AppState>,
    Path((project_id, finding_id)): Path<(String, String)>,
) -> Result<Json<FindingExpansion>> {
    state
        .queries
        .expand_finding(&project_id, &finding_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("finding", &finding_id))
}

pub async fn dead_ends(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<DeadEnd>>> {
    Ok(Json(state.queries.dead_ends(&project_id).await?))
}

pub async fn pending_findings(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(filter): Query<PendingFindingFilter>,
) -> Result<Json<Vec<PendingFinding>>> {
    let pending = state
        .queries
        .pending_findings(&project_id, filter.status)
        .await?;
    Ok(Json(pending))
}

pub async fn hypotheses(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(filter): Query<HypothesisFilter>,
) -> Result<Json<Vec<Hypothesis>>> {
    let hypotheses = state
        .queries
        .hypotheses(&project_id, filter.status)
        .await?;
    Ok(Json(hypotheses))
}

pub async fn task_tree(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<TaskTreeNode>>> {
    Ok(Json(state.queries.task_tree(&project_id).await?))
}

// ============= Contributors =============

pub async fn list_contributors(State(state): State<AppState>) -> Result<Json<Vec<Contributor>>> {
    Ok(Json(state.queries.contributors().await?))
}

pub async fn get_contributor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Contributor>> {
    Ok(Json(state.queries.contributor(&id).await?))
}

pub async fn register_contributor(
    State(state): State<AppState>,
    Json(payload): Json<NewContributor>,
) -> Result<Json<Contributor>> {
    Ok(Json(state.registry.register_contributor(payload).await?))
}

/// Returns the contributor with the given display name, registering it if
/// needed. Workers call this on startup.
pub async fn get_or_create_contributor(
    State(state): State<AppState>,
    Json(payload): Json<NewContributor>,
) -> Result<Json<Contributor>> {
    Ok(Json(state.registry.get_or_create_contributor(payload).await?))
}
