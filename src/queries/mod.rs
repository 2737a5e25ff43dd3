//! Pull-based read operations for dashboards, workers and the CLI.
//!
//! Nothing here mutates the store. Callers that want live updates poll.

use crate::db::EntityStore;
use crate::models::{
    Contributor, DeadEnd, Finding, Hypothesis, HypothesisStatus, PendingFinding,
    PendingFindingStatus, Project, Task, TaskStatus,
};
use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Number of findings listed on the dashboard.
const RECENT_FINDINGS: usize = 10;

/// Aggregate counts for one project or the whole lab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// PENDING plus ASSIGNED.
    pub active_tasks: i64,
    pub completed_tasks: i64,
    pub blocked_tasks: i64,
    pub total_tasks: i64,
    pub verified_findings: i64,
    pub recent_findings: Vec<Finding>,
    pub contributor_count: i64,
    pub hypotheses_testing: i64,
    pub hypotheses_supported: i64,
    pub hypotheses_refuted: i64,
}

/// Full detail of one verified finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingExpansion {
    pub finding_id: String,
    pub title: String,
    pub confidence: crate::models::Confidence,
    pub source: String,
    pub implications: String,
    pub summary_l0: Option<String>,
    pub summary_l1: Option<String>,
    pub created_at: i64,
}

impl From<Finding> for FindingExpansion {
    fn from(f: Finding) -> Self {
        Self {
            finding_id: f.finding_id,
            title: f.title,
            confidence: f.confidence,
            source: f.source,
            implications: f.implications,
            summary_l0: f.summary_l0,
            summary_l1: f.summary_l1,
            created_at: f.created_at,
        }
    }
}

/// A task with its forks, for rendering the task tree of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTreeNode {
    pub task: Task,
    pub children: Vec<TaskTreeNode>,
}

pub struct LabQueries {
    store: Arc<EntityStore>,
}

impl LabQueries {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    pub async fn dashboard_stats(&self, project_id: Option<&str>) -> Result<DashboardStats> {
        let conn = self.store.read().await?;
        if let Some(project_id) = project_id {
            conn.require_project(project_id).await?;
        }

        let tasks = conn.count_tasks_by_status(project_id).await?;
        let count = |status: TaskStatus| tasks.get(&status).copied().unwrap_or(0);
        let hypotheses: HashMap<HypothesisStatus, i64> = conn
            .count_hypotheses_by_status(project_id)
            .await?
            .into_iter()
            .collect();
        let hypothesis_count =
            |status: HypothesisStatus| hypotheses.get(&status).copied().unwrap_or(0);

        Ok(DashboardStats {
            active_tasks: count(TaskStatus::Pending) + count(TaskStatus::Assigned),
            completed_tasks: count(TaskStatus::Completed),
            blocked_tasks: count(TaskStatus::Blocked),
            total_tasks: tasks.values().sum(),
            verified_findings: conn.count_findings(project_id).await?,
            recent_findings: conn.recent_findings(project_id, RECENT_FINDINGS).await?,
            contributor_count: conn.count_contributors().await?,
            hypotheses_testing: hypothesis_count(HypothesisStatus::Testing),
            hypotheses_supported: hypothesis_count(HypothesisStatus::Supported),
            hypotheses_refuted: hypothesis_count(HypothesisStatus::Refuted),
        })
    }

    /// PENDING tasks in claim order. Dependency gating and verifier
    /// exclusion are applied only at claim time.
    pub async fn available_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>> {
        let conn = self.store.read().await?;
        conn.pending_tasks(project_id).await
    }

    pub async fn projects(&self) -> Result<Vec<Project>> {
        let conn = self.store.read().await?;
        conn.list_projects().await
    }

    pub async fn project_by_slug(&self, slug: &str) -> Result<Project> {
        let conn = self.store.read().await?;
        conn.get_project_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::not_found("project", slug))
    }

    pub async fn task(&self, id: &str) -> Result<Task> {
        let conn = self.store.read().await?;
        conn.require_task(id).await
    }

    /// Verified findings, newest first.
    pub async fn findings(&self, project_id: &str) -> Result<Vec<Finding>> {
        let conn = self.store.read().await?;
        conn.require_project(project_id).await?;
        conn.findings_newest_first(project_id).await
    }

    pub async fn dead_ends(&self, project_id: &str) -> Result<Vec<DeadEnd>> {
        let conn = self.store.read().await?;
        conn.require_project(project_id).await?;
        conn.dead_ends(project_id, None).await
    }

    pub async fn pending_findings(
        &self,
        project_id: &str,
        status: Option<PendingFindingStatus>,
    ) -> Result<Vec<PendingFinding>> {
        let conn = self.store.read().await?;
        conn.require_project(project_id).await?;
        conn.pending_findings(project_id, status).await
    }

    pub async fn pending_finding(&self, id: &str) -> Result<PendingFinding> {
        let conn = self.store.read().await?;
        conn.require_pending_finding(id).await
    }

    pub async fn hypotheses(
        &self,
        project_id: &str,
        status: Option<HypothesisStatus>,
    ) -> Result<Vec<Hypothesis>> {
        let conn = self.store.read().await?;
        conn.require_project(project_id).await?;
        conn.hypotheses(project_id, status).await
    }

    /// Tasks of a project arranged by `parent_id`. Roots keep creation order.
    pub async fn task_tree(&self, project_id: &str) -> Result<Vec<TaskTreeNode>> {
        let conn = self.store.read().await?;
        conn.require_project(project_id).await?;
        let tasks = conn.project_tasks(project_id).await?;
        Ok(build_tree(tasks))
    }

    /// Full detail of a finding by its `F-nnn` identifier, if it exists.
    pub async fn expand_finding(
        &self,
        project_id: &str,
        finding_id: &str,
    ) -> Result<Option<FindingExpansion>> {
        let conn = self.store.read().await?;
        Ok(conn
            .get_finding_by_human_id(project_id, finding_id)
            .await?
            .map(FindingExpansion::from))
    }

    pub async fn contributors(&self) -> Result<Vec<Contributor>> {
        let conn = self.store.read().await?;
        conn.list_contributors().await
    }

    pub async fn contributor(&self, id: &str) -> Result<Contributor> {
        let conn = self.store.read().await?;
        conn.require_contributor(id).await
    }
}

fn build_tree(tasks: Vec<Task>) -> Vec<TaskTreeNode> {
    let known: std::collections::HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut children: HashMap<String, Vec<Task>> = HashMap::new();
    let mut roots = Vec::new();

    for task in tasks {
        match task.parent_id.clone() {
            // a parent in another project is treated as absent
            Some(parent) if known.contains(&parent) => {
                children.entry(parent).or_default().push(task)
            }
            _ => roots.push(task),
        }
    }

    fn attach(task: Task, children: &mut HashMap<String, Vec<Task>>) -> TaskTreeNode {
        let kids = children.remove(&task.id).unwrap_or_default();
        TaskTreeNode {
            children: kids.into_iter().map(|k| attach(k, children)).collect(),
            task,
        }
    }

    roots
        .into_iter()
        .map(|root| attach(root, &mut children))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, TaskBrief};

    fn task(id: &str, parent: Option<&str>) -> Task {
        let mut task = NewTask {
            project_id: "p".to_string(),
            parent_id: parent.map(str::to_string),
            priority: 5,
            depends_on: vec![],
            brief: TaskBrief::research(id, ""),
        }
        .into_task(0);
        task.id = id.to_string();
        task
    }

    #[test]
    fn test_tree_nests_forks_under_parents() {
        let tree = build_tree(vec![
            task("root", None),
            task("fork-1", Some("root")),
            task("fork-2", Some("fork-1")),
            task("other", None),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].task.id, "root");
        assert_eq!(tree[0].children[0].task.id, "fork-1");
        assert_eq!(tree[0].children[0].children[0].task.id, "fork-2");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let tree = build_tree(vec![task("orphan", Some("elsewhere"))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].task.id, "orphan");
    }

    #[tokio::test]
    async fn test_empty_lab_dashboard() {
        let queries = LabQueries::new(Arc::new(EntityStore::new_memory().await.unwrap()));
        let stats = queries.dashboard_stats(None).await.unwrap();
        assert_eq!(stats, DashboardStats::default());
    }
}
