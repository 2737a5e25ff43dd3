//! Findings, votes, dead ends and hypotheses.

use crate::{
    models::{
        DeadEnd, Hypothesis, HypothesisVerdict, NewDeadEnd, NewFinding, NewHypothesis,
        PendingFinding, Verdict,
    },
    types::Result,
    verification::VoteOutcome,
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub verifier_id: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveHypothesisRequest {
    pub verdict: HypothesisVerdict,
    #[serde(default)]
    pub result: Option<String>,
}

/// Submits a finding for verification. Three VERIFY tasks are queued with it.
pub async fn submit_finding(
    State(state): State<AppState>,
    Json(payload): Json<NewFinding>,
) -> Result<Json<PendingFinding>> {
    Ok(Json(state.consensus.submit_finding(payload).await?))
}

pub async fn get_pending_finding(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PendingFinding>> {
    Ok(Json(state.queries.pending_finding(&id).await?))
}

/// Casts a verification vote. The third vote decides the finding.
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>> {
    let outcome = state
        .consensus
        .cast_vote(&id, &payload.verifier_id, payload.verdict, &payload.notes)
        .await?;
    Ok(Json(outcome))
}

pub async fn record_dead_end(
    State(state): State<AppState>,
    Json(payload): Json<NewDeadEnd>,
) -> Result<Json<DeadEnd>> {
    Ok(Json(state.consensus.record_dead_end(payload).await?))
}

/// Records a hypothesis and queues its test task.
pub async fn submit_hypothesis(
    State(state): State<AppState>,
    Json(payload): Json<NewHypothesis>,
) -> Result<Json<Hypothesis>> {
    Ok(Json(state.hypotheses.submit_hypothesis(payload).await?))
}

pub async fn resolve_hypothesis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ResolveHypothesisRequest>,
) -> Result<Json<Hypothesis>> {
    let hypothesis = state
        .hypotheses
        .resolve_hypothesis(&id, payload.verdict, payload.result.as_deref())
        .await?;
    Ok(Json(hypothesis))
}
