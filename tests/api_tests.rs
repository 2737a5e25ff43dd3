use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use openlab::api::routes;

mod common;
use common::Lab;

async fn create_test_server() -> (Lab, TestServer) {
    let lab = Lab::new().await;
    let app = routes::app(lab.state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");
    (lab, server)
}

async fn create_project(server: &TestServer, slug: &str) -> Value {
    let response = server
        .post("/api/projects")
        .json(&json!({
            "slug": slug,
            "name": "Neoantigen immunogenicity",
            "description": "Predict which neoantigens elicit a T-cell response.",
            "field": "oncology"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

async fn register(server: &TestServer, name: &str) -> Value {
    let response = server
        .post("/api/contributors")
        .json(&json!({ "display_name": name, "provider": "claude" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

// ============= Health & Stats =============

#[tokio::test]
async fn test_health_endpoint() {
    let (_lab, server) = create_test_server().await;

    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_stats_on_empty_lab() {
    let (_lab, server) = create_test_server().await;

    let body: Value = server.get("/api/stats").await.json();
    assert_eq!(body["total_tasks"], 0);
    assert_eq!(body["contributor_count"], 0);
    assert_eq!(body["recent_findings"], json!([]));
}

// ============= Projects & Contributors =============

#[tokio::test]
async fn test_project_lookup_by_slug() {
    let (_lab, server) = create_test_server().await;
    let project = create_project(&server, "neoantigen").await;
    assert_eq!(project["status"], "ACTIVE");
    assert_eq!(project["visibility"], "PUBLIC");

    let found: Value = server.get("/api/projects/by-slug/neoantigen").await.json();
    assert_eq!(found["id"], project["id"]);

    let missing = server.get("/api/projects/by-slug/nothing-here").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_slug_is_bad_request() {
    let (_lab, server) = create_test_server().await;

    let response = server
        .post("/api/projects")
        .json(&json!({ "slug": "Not A Slug", "name": "x" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().starts_with("Validation error"));
}

#[tokio::test]
async fn test_get_or_create_contributor() {
    let (_lab, server) = create_test_server().await;

    let first: Value = server
        .post("/api/contributors/get-or-create")
        .json(&json!({ "display_name": "alice", "provider": "claude" }))
        .await
        .json();
    let second: Value = server
        .post("/api/contributors/get-or-create")
        .json(&json!({ "display_name": "alice", "provider": "claude" }))
        .await
        .json();
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["capabilities"], json!(["cpu"]));

    let duplicate = server
        .post("/api/contributors")
        .json(&json!({ "display_name": "alice", "provider": "claude" }))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::BAD_REQUEST);
}

// ============= Task Lifecycle =============

#[tokio::test]
async fn test_create_claim_complete_over_http() {
    let (_lab, server) = create_test_server().await;
    let project = create_project(&server, "neoantigen").await;
    let alice = register(&server, "alice").await;

    let created = server
        .post("/api/tasks")
        .json(&json!({
            "project_id": project["id"],
            "brief": {
                "kind": "research",
                "title": "Collect IEDB export",
                "description": "Download T-cell assays"
            }
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::OK);
    let task: Value = created.json();
    assert_eq!(task["status"], "PENDING");
    assert_eq!(task["task_type"], "RESEARCH");
    assert_eq!(task["priority"], 5);

    let available: Value = server.get("/api/tasks/available").await.json();
    assert_eq!(available.as_array().unwrap().len(), 1);

    let claim: Value = server
        .post("/api/tasks/claim")
        .json(&json!({ "contributor_id": alice["id"] }))
        .await
        .json();
    let claimed = &claim["task"];
    assert_eq!(claimed["id"], task["id"]);
    assert_eq!(claimed["status"], "ASSIGNED");
    assert!(claimed["context_markdown"]
        .as_str()
        .unwrap()
        .starts_with("# TASK.md"));

    // Nothing left to claim.
    let empty: Value = server
        .post("/api/tasks/claim")
        .json(&json!({ "contributor_id": alice["id"] }))
        .await
        .json();
    assert!(empty["task"].is_null());

    let id = task["id"].as_str().unwrap();
    let heartbeat: Value = server
        .post(&format!("/api/tasks/{}/heartbeat", id))
        .json(&json!({ "contributor_id": alice["id"] }))
        .await
        .json();
    assert!(heartbeat["lease_expires_at"].is_i64());

    // Only the assignee may report the result.
    let mallory = register(&server, "mallory").await;
    let refused = server
        .post(&format!("/api/tasks/{}/complete", id))
        .json(&json!({ "contributor_id": mallory["id"], "result": "forged" }))
        .await;
    assert_eq!(refused.status_code(), StatusCode::BAD_REQUEST);

    let done = server
        .post(&format!("/api/tasks/{}/complete", id))
        .json(&json!({
            "contributor_id": alice["id"],
            "result": "4,812 positive assays",
            "tokens_used": 1500
        }))
        .await;
    assert_eq!(done.status_code(), StatusCode::OK);
    let done: Value = done.json();
    assert_eq!(done["status"], "COMPLETED");

    let alice: Value = server
        .get(&format!("/api/contributors/{}", alice["id"].as_str().unwrap()))
        .await
        .json();
    assert_eq!(alice["tasks_completed"], 1);
    assert_eq!(alice["tokens_contributed"], 1500);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (_lab, server) = create_test_server().await;

    let response = server.get("/api/tasks/does-not-exist").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .post("/api/tasks/does-not-exist/complete")
        .json(&json!({ "contributor_id": "ghost", "result": "x" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_claim_for_unknown_contributor_is_not_found() {
    let (_lab, server) = create_test_server().await;

    let response = server
        .post("/api/tasks/claim")
        .json(&json!({ "contributor_id": "ghost" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ============= Verification =============

#[tokio::test]
async fn test_finding_and_votes_over_http() {
    let (lab, server) = create_test_server().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    let bob = lab.contributor("bob").await;

    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let task = lab.claim(&alice).await;

    let submitted = server
        .post("/api/findings")
        .json(&json!({
            "project_id": project.id,
            "title": "P2 anchors drive immunogenicity",
            "confidence": "MEDIUM",
            "source": "IEDB",
            "task_id": task.id,
            "user_id": alice.id
        }))
        .await;
    assert_eq!(submitted.status_code(), StatusCode::OK);
    let pf: Value = submitted.json();
    assert_eq!(pf["finding_id"], "PF-001");
    assert_eq!(pf["status"], "PENDING_VERIFICATION");
    let pf_id = pf["id"].as_str().unwrap();

    let own = server
        .post(&format!("/api/pending-findings/{}/votes", pf_id))
        .json(&json!({ "verifier_id": alice.id, "verdict": "PASS", "notes": "mine" }))
        .await;
    assert_eq!(own.status_code(), StatusCode::BAD_REQUEST);

    let vote: Value = server
        .post(&format!("/api/pending-findings/{}/votes", pf_id))
        .json(&json!({ "verifier_id": bob.id, "verdict": "PASS", "notes": "reproduced" }))
        .await
        .json();
    assert_eq!(vote["outcome"], "recorded");
    assert_eq!(vote["votes_cast"], 1);

    let listed: Value = server
        .get(&format!(
            "/api/projects/{}/pending-findings?status=PENDING_VERIFICATION",
            project.id
        ))
        .await
        .json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["votes"][0]["verdict"], "PASS");
}

#[tokio::test]
async fn test_missing_finding_expansion_is_not_found() {
    let (lab, server) = create_test_server().await;
    let project = lab.project("neoantigen").await;

    let response = server
        .get(&format!("/api/projects/{}/findings/F-042", project.id))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ============= Tickets & Notebook =============

#[tokio::test]
async fn test_ticket_flow_and_tag_filter() {
    let (lab, server) = create_test_server().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&project, "Run docking", 5, &[]).await;
    let task = lab.claim(&alice).await;

    let ticket: Value = server
        .post("/api/tickets")
        .json(&json!({
            "task_id": task.id,
            "ticket_type": "GPU_JOB",
            "priority": "URGENT",
            "question": "Fold 40 peptide-MHC complexes",
            "routing_tags": ["gpu", "alphafold"]
        }))
        .await
        .json();
    assert_eq!(ticket["ticket_id"], "JOB-001");
    assert_eq!(ticket["status"], "OPEN");
    let ticket_id = ticket["id"].as_str().unwrap();

    let gpu: Value = server.get("/api/tickets?tags=gpu,wetlab").await.json();
    assert_eq!(gpu.as_array().unwrap().len(), 1);
    let wetlab: Value = server.get("/api/tickets?tags=wetlab").await.json();
    assert!(wetlab.as_array().unwrap().is_empty());

    let resolved: Value = server
        .post(&format!("/api/tickets/{}/resolve", ticket_id))
        .json(&json!({ "result": "uploaded" }))
        .await
        .json();
    assert_eq!(resolved["status"], "RESOLVED");

    // A resolved ticket cannot expire.
    let expired = server
        .post(&format!("/api/tickets/{}/expire", ticket_id))
        .await;
    assert_eq!(expired.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notebook_append_and_read() {
    let (lab, server) = create_test_server().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let task = lab.claim(&alice).await;
    let path = format!("/api/tasks/{}/notebook", task.id);

    for (entry_type, content) in [
        ("OBSERVATION", "Export has 4,812 positive assays"),
        ("DECISION", "Restrict to HLA-A*02:01"),
    ] {
        let response = server
            .post(&path)
            .json(&json!({
                "contributor_id": alice.id,
                "entry_type": entry_type,
                "content": content
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let entries: Value = server.get(&path).await.json();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["entry_type"], "OBSERVATION");
    assert_eq!(entries[1]["content"], "Restrict to HLA-A*02:01");
}
