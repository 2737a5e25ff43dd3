//! Per-task lab notebook: an append-only log of what a worker observed and
//! decided while executing a task.

use crate::db::{now_millis, EntityStore};
use crate::models::{NotebookEntry, NotebookEntryType};
use crate::types::{AppError, Result};
use std::sync::Arc;
use tracing::debug;

pub struct LabNotebook {
    store: Arc<EntityStore>,
}

impl LabNotebook {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Appends one entry to the task's notebook. The project is taken from the
    /// task.
    pub async fn append(
        &self,
        task_id: &str,
        contributor_id: Option<&str>,
        entry_type: NotebookEntryType,
        content: &str,
    ) -> Result<NotebookEntry> {
        if content.trim().is_empty() {
            return Err(AppError::validation("Notebook entry content is required"));
        }

        let conn = self.store.read().await?;
        let task = conn.require_task(task_id).await?;
        if let Some(contributor_id) = contributor_id {
            conn.require_contributor(contributor_id).await?;
        }

        let entry = NotebookEntry {
            task_id: task.id,
            project_id: task.project_id,
            contributor_id: contributor_id.map(str::to_string),
            entry_type,
            content: content.to_string(),
            recorded_at: now_millis(),
        };
        conn.insert_notebook_entry(&entry).await?;

        debug!(task_id, entry_type = %entry.entry_type, "notebook entry appended");
        Ok(entry)
    }

    /// Entries of a task in the order they were written.
    pub async fn entries(&self, task_id: &str) -> Result<Vec<NotebookEntry>> {
        let conn = self.store.read().await?;
        conn.require_task(task_id).await?;
        conn.notebook_for_task(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProject, NewTask, TaskBrief};

    async fn notebook_with_task() -> (LabNotebook, String) {
        let store = Arc::new(EntityStore::new_memory().await.unwrap());
        let task_id = {
            let tx = store.begin().await.unwrap();
            let project = crate::registry::project_from(NewProject {
                slug: "nb".to_string(),
                name: "Notebook".to_string(),
                description: String::new(),
                field: String::new(),
                visibility: crate::models::Visibility::Public,
            }, 1);
            tx.insert_project(&project).await.unwrap();
            let task = NewTask {
                project_id: project.id.clone(),
                parent_id: None,
                priority: 5,
                depends_on: vec![],
                brief: TaskBrief::research("Look", "Look closer"),
            }
            .into_task(2);
            tx.insert_task(&task).await.unwrap();
            tx.commit().await.unwrap();
            task.id
        };
        (LabNotebook::new(store), task_id)
    }

    #[tokio::test]
    async fn test_entries_keep_append_order() {
        let (notebook, task_id) = notebook_with_task().await;
        notebook
            .append(&task_id, None, NotebookEntryType::Observation, "binding scores are bimodal")
            .await
            .unwrap();
        notebook
            .append(&task_id, None, NotebookEntryType::Decision, "split by allele")
            .await
            .unwrap();

        let entries = notebook.entries(&task_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, NotebookEntryType::Observation);
        assert_eq!(entries[1].content, "split by allele");
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (notebook, task_id) = notebook_with_task().await;
        let err = notebook
            .append(&task_id, None, NotebookEntryType::Result, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (notebook, _) = notebook_with_task().await;
        let err = notebook.entries("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
