use crate::api::handlers::{knowledge, lab, tasks, tickets};
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Routes mounted under `/api`.
pub fn create_router() -> Router<AppState> {
    let lab_routes = Router::new()
        .route("/health", get(lab::health))
        .route("/stats", get(lab::dashboard_stats))
        .route(
            "/projects",
            get(lab::list_projects).post(lab::create_project),
        )
        .route("/projects/by-slug/{slug}", get(lab::project_by_slug))
        .route("/projects/{id}/status", post(lab::set_project_status))
        .route("/projects/{id}/findings", get(lab::findings))
        .route(
            "/projects/{id}/findings/{finding_id}",
            get(lab::expand_finding),
        )
        .route("/projects/{id}/dead-ends", get(lab::dead_ends))
        .route(
            "/projects/{id}/pending-findings",
            get(lab::pending_findings),
        )
        .route("/projects/{id}/hypotheses", get(lab::hypotheses))
        .route("/projects/{id}/task-tree", get(lab::task_tree))
        .route(
            "/contributors",
            get(lab::list_contributors).post(lab::register_contributor),
        )
        .route(
            "/contributors/get-or-create",
            post(lab::get_or_create_contributor),
        )
        .route("/contributors/{id}", get(lab::get_contributor))
        .route(
            "/contributors/{id}/resumable-tasks",
            get(tasks::resumable_tasks),
        );

    let task_routes = Router::new()
        .route("/tasks", post(tasks::create_task))
        .route("/tasks/available", get(tasks::available_tasks))
        .route("/tasks/claim", post(tasks::claim_task))
        .route("/tasks/reclaim", post(tasks::reclaim_expired))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/tasks/{id}/complete", post(tasks::complete_task))
        .route("/tasks/{id}/fail", post(tasks::fail_task))
        .route("/tasks/{id}/suspend", post(tasks::suspend_task))
        .route("/tasks/{id}/resume", post(tasks::resume_task))
        .route("/tasks/{id}/heartbeat", post(tasks::heartbeat))
        .route(
            "/tasks/{id}/notebook",
            get(tickets::notebook).post(tickets::append_notebook_entry),
        );

    let knowledge_routes = Router::new()
        .route("/findings", post(knowledge::submit_finding))
        .route(
            "/pending-findings/{id}",
            get(knowledge::get_pending_finding),
        )
        .route("/pending-findings/{id}/votes", post(knowledge::cast_vote))
        .route("/dead-ends", post(knowledge::record_dead_end))
        .route("/hypotheses", post(knowledge::submit_hypothesis))
        .route(
            "/hypotheses/{id}/resolve",
            post(knowledge::resolve_hypothesis),
        );

    let ticket_routes = Router::new()
        .route(
            "/tickets",
            get(tickets::open_tickets).post(tickets::create_ticket),
        )
        .route("/tickets/{id}/claim", post(tickets::claim_ticket))
        .route("/tickets/{id}/resolve", post(tickets::resolve_ticket))
        .route("/tickets/{id}/expire", post(tickets::expire_ticket));

    lab_routes
        .merge(task_routes)
        .merge(knowledge_routes)
        .merge(ticket_routes)
}

/// The complete application: `/api` routes plus tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityStore, LabConfig, LabConfigManager};
    use axum::{body::Body, http::Request, http::StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let store = Arc::new(EntityStore::new_memory().await.unwrap());
        let config = Arc::new(LabConfigManager::from_config(LabConfig::default()));
        app(AppState::new(store, config))
    }

    #[tokio::test]
    async fn test_routes_are_nested_under_api() {
        let response = test_app()
            .await
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = test_app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
