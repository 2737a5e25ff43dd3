//! Projects and contributors.
//!
//! Contributors are the identities workers claim under. Their counters are
//! only ever moved by the scheduler when a task completes.

use crate::db::{now_millis, EntityStore};
use crate::models::{Contributor, NewContributor, NewProject, Project, ProjectStatus};
use crate::types::{AppError, Result};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CAPABILITY: &str = "cpu";

pub struct LabRegistry {
    store: Arc<EntityStore>,
}

/// Builds an ACTIVE project row from its creation input.
pub fn project_from(input: NewProject, now: i64) -> Project {
    Project {
        id: uuid::Uuid::new_v4().to_string(),
        slug: input.slug,
        name: input.name,
        description: input.description,
        field: input.field,
        visibility: input.visibility,
        status: ProjectStatus::Active,
        created_at: now,
    }
}

fn contributor_from(input: NewContributor, now: i64) -> Contributor {
    let capabilities = if input.capabilities.is_empty() {
        vec![DEFAULT_CAPABILITY.to_string()]
    } else {
        input.capabilities
    };
    Contributor {
        id: uuid::Uuid::new_v4().to_string(),
        display_name: input.display_name,
        provider: input.provider,
        capabilities,
        tasks_completed: 0,
        tokens_contributed: 0,
        joined_at: now,
        last_active_at: None,
    }
}

fn is_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl LabRegistry {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    pub async fn create_project(&self, input: NewProject) -> Result<Project> {
        if !is_slug(&input.slug) {
            return Err(AppError::validation(format!(
                "Project slug '{}' must be lowercase letters, digits and dashes",
                input.slug
            )));
        }
        if input.name.trim().is_empty() {
            return Err(AppError::validation("Project name is required"));
        }

        let project = project_from(input, now_millis());
        let conn = self.store.read().await?;
        conn.insert_project(&project).await?;

        info!(project_id = %project.id, slug = %project.slug, "project created");
        Ok(project)
    }

    pub async fn set_project_status(&self, id: &str, status: ProjectStatus) -> Result<Project> {
        let conn = self.store.read().await?;
        if !conn.set_project_status(id, status).await? {
            return Err(AppError::not_found("project", id));
        }
        info!(project_id = id, %status, "project status changed");
        conn.require_project(id).await
    }

    /// Registers a new contributor. Display names are unique.
    pub async fn register_contributor(&self, input: NewContributor) -> Result<Contributor> {
        if input.display_name.trim().is_empty() {
            return Err(AppError::validation("Display name is required"));
        }

        let conn = self.store.read().await?;
        if conn.get_contributor_by_name(&input.display_name).await?.is_some() {
            return Err(AppError::validation(format!(
                "Display name '{}' is already registered",
                input.display_name
            )));
        }

        let contributor = contributor_from(input, now_millis());
        conn.insert_contributor(&contributor).await?;

        info!(contributor_id = %contributor.id, name = %contributor.display_name, "contributor registered");
        Ok(contributor)
    }

    /// Returns the contributor with this display name, registering it first
    /// if needed.
    pub async fn get_or_create_contributor(&self, input: NewContributor) -> Result<Contributor> {
        if input.display_name.trim().is_empty() {
            return Err(AppError::validation("Display name is required"));
        }

        let tx = self.store.begin().await?;
        let outcome = match tx.get_contributor_by_name(&input.display_name).await {
            Ok(Some(existing)) => Ok((existing, false)),
            Ok(None) => {
                let contributor = contributor_from(input, now_millis());
                tx.insert_contributor(&contributor)
                    .await
                    .map(|_| (contributor, true))
            }
            Err(e) => Err(e),
        };
        let (contributor, created) = tx.finish(outcome).await?;

        if created {
            info!(contributor_id = %contributor.id, name = %contributor.display_name, "contributor registered");
        }
        Ok(contributor)
    }
}
