//! File-backed store: state and identifier sequences survive a restart.

mod common;

use common::Lab;
use openlab::db::DatabaseProvider;
use openlab::models::{PendingFindingStatus, TaskStatus};
use openlab::utils::toml_config::{DatabaseConfig, LabConfig};
use tempfile::TempDir;

async fn open_lab(dir: &TempDir) -> Lab {
    let path = dir.path().join("data").join("openlab.db");
    let config = DatabaseConfig {
        url: path.to_string_lossy().into_owned(),
        ..DatabaseConfig::default()
    };
    let provider = DatabaseProvider::from_config(&config);
    assert!(matches!(provider, DatabaseProvider::SQLite { .. }));

    let store = provider.open().await.expect("Failed to open file store");
    Lab::with_store(store, LabConfig::default())
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let (project_id, task_id, brief, pf_id) = {
        let lab = open_lab(&dir).await;
        let project = lab.project("neoantigen").await;
        let alice = lab.contributor("alice").await;
        lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
        let task = lab.claim(&alice).await;
        let pf = lab
            .submit_finding(&project, &task, &alice, "P2 anchors drive immunogenicity")
            .await;
        (project.id, task.id, task.context_markdown.unwrap(), pf.id)
    };

    let lab = open_lab(&dir).await;

    let task = lab.state.queries.task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.context_markdown.unwrap(), brief);

    let pf = lab.state.queries.pending_finding(&pf_id).await.unwrap();
    assert_eq!(pf.status, PendingFindingStatus::PendingVerification);
    assert_eq!(pf.verify_task_ids.len(), 3);

    let project = lab.state.queries.project_by_slug("neoantigen").await.unwrap();
    assert_eq!(project.id, project_id);
}

#[tokio::test]
async fn test_identifier_sequences_continue_after_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let lab = open_lab(&dir).await;
        let project = lab.project("neoantigen").await;
        let alice = lab.contributor("alice").await;
        lab.research_task(&project, "First", 5, &[]).await;
        let task = lab.claim(&alice).await;
        let first = lab.submit_finding(&project, &task, &alice, "First finding").await;
        assert_eq!(first.finding_id, "PF-001");
    }

    let lab = open_lab(&dir).await;
    let project = lab.state.queries.project_by_slug("neoantigen").await.unwrap();
    let bob = lab.contributor("bob").await;
    lab.research_task(&project, "Second", 9, &[]).await;

    // Verify tasks from the first run outrank it, so skip past them.
    let mut task = lab.claim(&bob).await;
    while task.task_type != openlab::models::TaskType::Research {
        task = lab.claim(&bob).await;
    }
    let second = lab.submit_finding(&project, &task, &bob, "Second finding").await;
    assert_eq!(second.finding_id, "PF-002");
}
