//! Pyramid context assembly.
//!
//! Runs once per claim, inside the claim transaction, and produces the
//! [`AssembledContext`] that is frozen on the task together with its rendered
//! markdown.

mod markdown;

pub use markdown::render_task_markdown;

use crate::db::StoreConn;
use crate::models::{
    AssembledContext, DeadEndNote, DependencyResult, Finding, FindingDetail, FindingHeadline,
    FindingSummary, Task, TaskStatus, TieredFindings,
};
use crate::types::Result;
use crate::utils::toml_config::{ContextConfig, LabConfigManager};
use std::collections::HashSet;
use std::sync::Arc;

/// Builds the tiered knowledge snapshot for a task being claimed.
pub struct ContextAssembler {
    config: Arc<LabConfigManager>,
}

impl ContextAssembler {
    pub fn new(config: Arc<LabConfigManager>) -> Self {
        Self { config }
    }

    pub async fn assemble(&self, conn: &StoreConn<'_>, task: &Task) -> Result<AssembledContext> {
        let limits = self.config.config().context.clone();
        let project = conn.require_project(&task.project_id).await?;

        let findings = conn.findings_newest_first(&task.project_id).await?;
        let tiers = tier_findings(&findings, &task.depends_on, &limits);

        let dead_ends = conn
            .dead_ends(&task.project_id, Some(limits.dead_end_limit))
            .await?
            .into_iter()
            .map(|de| DeadEndNote {
                dead_end_id: de.dead_end_id,
                what: de.what,
                why_failed: de.why_failed,
                lesson: de.lesson,
            })
            .collect();

        let mut dependency_results = Vec::new();
        for dep_id in &task.depends_on {
            if let Some(dep) = conn.get_task(dep_id).await? {
                if let (TaskStatus::Completed, Some(result)) = (dep.status, dep.result) {
                    dependency_results.push(DependencyResult {
                        task_id: dep.id,
                        result,
                    });
                }
            }
        }

        let parent_result = match &task.parent_id {
            Some(parent_id) => conn.get_task(parent_id).await?.and_then(|p| p.result),
            None => None,
        };

        tracing::debug!(
            task_id = %task.id,
            l2 = tiers.l2.len(),
            l1 = tiers.l1.len(),
            l0 = tiers.l0.len(),
            "assembled task context"
        );

        Ok(AssembledContext {
            brief: task.brief.clone(),
            findings: tiers,
            dead_ends,
            dependency_results,
            parent_result,
            project_description: project.description,
        })
    }
}

/// Splits findings (newest first) into the three pyramid levels.
///
/// L2 holds every finding produced by a direct dependency, oldest first. The
/// rest fill L1 then L0 in recency order up to their limits.
pub fn tier_findings(
    newest_first: &[Finding],
    depends_on: &[String],
    limits: &ContextConfig,
) -> TieredFindings {
    let deps: HashSet<&str> = depends_on.iter().map(String::as_str).collect();

    let mut l2: Vec<FindingDetail> = newest_first
        .iter()
        .filter(|f| deps.contains(f.created_by_task.as_str()))
        .map(|f| FindingDetail {
            finding_id: f.finding_id.clone(),
            title: f.title.clone(),
            confidence: f.confidence,
            source: f.source.clone(),
            implications: f.implications.clone(),
        })
        .collect();
    l2.reverse();

    let mut rest = newest_first
        .iter()
        .filter(|f| !deps.contains(f.created_by_task.as_str()));

    let l1 = rest
        .by_ref()
        .take(limits.l1_limit)
        .map(|f| FindingSummary {
            finding_id: f.finding_id.clone(),
            confidence: f.confidence,
            summary: f.summary_l1.clone().unwrap_or_else(|| l1_fallback(f)),
        })
        .collect();

    let l0 = rest
        .take(limits.l0_limit)
        .map(|f| FindingHeadline {
            finding_id: f.finding_id.clone(),
            summary: f.summary_l0.clone().unwrap_or_else(|| f.title.clone()),
        })
        .collect();

    TieredFindings { l2, l1, l0 }
}

fn l1_fallback(f: &Finding) -> String {
    if f.implications.is_empty() {
        f.title.clone()
    } else {
        format!("{}. {}", f.title, f.implications)
    }
}
