//! Shared fixtures for the integration tests.
//!
//! Every test gets its own in-memory store, so tests never see each other's
//! rows.

#![allow(dead_code)]

use openlab::models::{
    Confidence, Contributor, NewContributor, NewFinding, NewProject, NewTask, PendingFinding,
    Project, Task, TaskBrief, Verdict, Visibility,
};
use openlab::utils::toml_config::LabConfig;
use openlab::{AppState, EntityStore, LabConfigManager, VoteOutcome};
use std::sync::Arc;

pub struct Lab {
    pub state: AppState,
}

impl Lab {
    pub async fn new() -> Self {
        Self::with_config(LabConfig::default()).await
    }

    pub async fn with_config(config: LabConfig) -> Self {
        let store = EntityStore::new_memory()
            .await
            .expect("Failed to create in-memory store");
        Self::with_store(store, config)
    }

    pub fn with_store(store: EntityStore, config: LabConfig) -> Self {
        let manager = Arc::new(LabConfigManager::from_config(config));
        Self {
            state: AppState::new(Arc::new(store), manager),
        }
    }

    pub async fn project(&self, slug: &str) -> Project {
        self.state
            .registry
            .create_project(NewProject {
                slug: slug.to_string(),
                name: format!("Project {}", slug),
                description: "Predict which neoantigens elicit a T-cell response.".to_string(),
                field: "oncology".to_string(),
                visibility: Visibility::Public,
            })
            .await
            .expect("Failed to create project")
    }

    pub async fn contributor(&self, name: &str) -> Contributor {
        self.state
            .registry
            .register_contributor(NewContributor {
                display_name: name.to_string(),
                provider: "claude".to_string(),
                capabilities: vec![],
            })
            .await
            .expect("Failed to register contributor")
    }

    pub async fn research_task(
        &self,
        project: &Project,
        title: &str,
        priority: i32,
        depends_on: &[&Task],
    ) -> Task {
        self.state
            .scheduler
            .create_task(NewTask {
                project_id: project.id.clone(),
                parent_id: None,
                priority,
                depends_on: depends_on.iter().map(|t| t.id.clone()).collect(),
                brief: TaskBrief::research(title, format!("Investigate {}", title)),
            })
            .await
            .expect("Failed to create task")
    }

    /// Claims the next task for `who` and fails the test when there is none.
    pub async fn claim(&self, who: &Contributor) -> Task {
        self.state
            .scheduler
            .claim_task(&who.id, None)
            .await
            .expect("claim failed")
            .expect("expected a task to be available")
    }

    pub async fn claim_opt(&self, who: &Contributor) -> Option<Task> {
        self.state
            .scheduler
            .claim_task(&who.id, None)
            .await
            .expect("claim failed")
    }

    pub async fn submit_finding(
        &self,
        project: &Project,
        task: &Task,
        who: &Contributor,
        title: &str,
    ) -> PendingFinding {
        self.state
            .consensus
            .submit_finding(NewFinding {
                project_id: project.id.clone(),
                title: title.to_string(),
                confidence: Confidence::High,
                source: "IEDB T-cell assays, 2024 export".to_string(),
                implications: "Hydrophobic P2 anchors matter".to_string(),
                task_id: task.id.clone(),
                user_id: who.id.clone(),
            })
            .await
            .expect("Failed to submit finding")
    }

    pub async fn vote(
        &self,
        pending: &PendingFinding,
        verifier: &Contributor,
        verdict: Verdict,
        notes: &str,
    ) -> VoteOutcome {
        self.state
            .consensus
            .cast_vote(&pending.id, &verifier.id, verdict, notes)
            .await
            .expect("vote failed")
    }
}
