//! Projects and contributors.

use super::store::{int, json, opt_int, parsed, text, to_json, StoreConn};
use crate::models::{Contributor, Project, ProjectStatus};
use crate::types::{AppError, Result};
use libsql::Row;

const PROJECT_COLUMNS: &str =
    "id, slug, name, description, field, visibility, status, created_at";

const CONTRIBUTOR_COLUMNS: &str = "id, display_name, provider, capabilities, tasks_completed,
     tokens_contributed, joined_at, last_active_at";

fn project_from_row(row: &Row) -> Result<Project> {
    Ok(Project {
        id: text(row, 0)?,
        slug: text(row, 1)?,
        name: text(row, 2)?,
        description: text(row, 3)?,
        field: text(row, 4)?,
        visibility: parsed(row, 5)?,
        status: parsed(row, 6)?,
        created_at: int(row, 7)?,
    })
}

fn contributor_from_row(row: &Row) -> Result<Contributor> {
    Ok(Contributor {
        id: text(row, 0)?,
        display_name: text(row, 1)?,
        provider: text(row, 2)?,
        capabilities: json(row, 3)?,
        tasks_completed: int(row, 4)?,
        tokens_contributed: int(row, 5)?,
        joined_at: int(row, 6)?,
        last_active_at: opt_int(row, 7)?,
    })
}

impl StoreConn<'_> {
    // ============== Projects ==============

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        self.execute(
            "INSERT INTO projects (id, slug, name, description, field, visibility, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                project.id.as_str(),
                project.slug.as_str(),
                project.name.as_str(),
                project.description.as_str(),
                project.field.as_str(),
                project.visibility.as_str(),
                project.status.as_str(),
                project.created_at,
            ),
        )
        .await
        .map_err(|e| match e {
            AppError::Database(msg) if msg.contains("UNIQUE") => {
                AppError::validation(format!("Project slug '{}' already exists", project.slug))
            }
            other => other,
        })?;
        Ok(())
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS);
        self.query_opt(&sql, [id], project_from_row).await
    }

    pub async fn require_project(&self, id: &str) -> Result<Project> {
        self.get_project(id)
            .await?
            .ok_or_else(|| AppError::not_found("project", id))
    }

    pub async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE slug = ?", PROJECT_COLUMNS);
        self.query_opt(&sql, [slug], project_from_row).await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {} FROM projects ORDER BY created_at, rowid",
            PROJECT_COLUMNS
        );
        self.query_all(&sql, (), project_from_row).await
    }

    pub async fn set_project_status(&self, id: &str, status: ProjectStatus) -> Result<bool> {
        let changed = self
            .execute(
                "UPDATE projects SET status = ? WHERE id = ?",
                (status.as_str(), id),
            )
            .await?;
        Ok(changed > 0)
    }

    // ============== Contributors ==============

    pub async fn insert_contributor(&self, contributor: &Contributor) -> Result<()> {
        self.execute(
            "INSERT INTO contributors (id, display_name, provider, capabilities, tasks_completed,
                 tokens_contributed, joined_at, last_active_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                contributor.id.as_str(),
                contributor.display_name.as_str(),
                contributor.provider.as_str(),
                to_json(&contributor.capabilities)?,
                contributor.tasks_completed,
                contributor.tokens_contributed,
                contributor.joined_at,
                contributor.last_active_at,
            ),
        )
        .await?;
        Ok(())
    }

    pub async fn get_contributor(&self, id: &str) -> Result<Option<Contributor>> {
        let sql = format!(
            "SELECT {} FROM contributors WHERE id = ?",
            CONTRIBUTOR_COLUMNS
        );
        self.query_opt(&sql, [id], contributor_from_row).await
    }

    pub async fn require_contributor(&self, id: &str) -> Result<Contributor> {
        self.get_contributor(id)
            .await?
            .ok_or_else(|| AppError::not_found("contributor", id))
    }

    pub async fn get_contributor_by_name(&self, display_name: &str) -> Result<Option<Contributor>> {
        let sql = format!(
            "SELECT {} FROM contributors WHERE display_name = ?",
            CONTRIBUTOR_COLUMNS
        );
        self.query_opt(&sql, [display_name], contributor_from_row)
            .await
    }

    /// Contributors ordered by completed task count, most active first.
    pub async fn list_contributors(&self) -> Result<Vec<Contributor>> {
        let sql = format!(
            "SELECT {} FROM contributors ORDER BY tasks_completed DESC, joined_at, rowid",
            CONTRIBUTOR_COLUMNS
        );
        self.query_all(&sql, (), contributor_from_row).await
    }

    pub async fn count_contributors(&self) -> Result<i64> {
        self.query_count("SELECT COUNT(*) FROM contributors", ())
            .await
    }

    pub async fn touch_contributor(&self, id: &str, now: i64) -> Result<()> {
        self.execute(
            "UPDATE contributors SET last_active_at = ? WHERE id = ?",
            (now, id),
        )
        .await?;
        Ok(())
    }

    /// Credits one completed task and `tokens` to the contributor.
    pub async fn credit_contributor(&self, id: &str, tokens: i64, now: i64) -> Result<()> {
        self.execute(
            "UPDATE contributors
             SET tasks_completed = tasks_completed + 1,
                 tokens_contributed = tokens_contributed + ?,
                 last_active_at = ?
             WHERE id = ?",
            (tokens, now, id),
        )
        .await?;
        Ok(())
    }
}
