//! Typed task context.
//!
//! A task is created with a [`TaskBrief`] describing what to do. When a worker
//! claims it, the context assembler wraps the brief into an
//! [`AssembledContext`] with the tiered knowledge snapshot.

use super::{Confidence, TaskType, Verdict};
use serde::{Deserialize, Serialize};

/// Seed context, one variant per kind of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskBrief {
    Research(ResearchBrief),
    Verify(VerifyBrief),
    /// Fork spawned by a rejected pending finding.
    ReResearch(ReResearchBrief),
}

impl TaskBrief {
    pub fn research(title: impl Into<String>, description: impl Into<String>) -> Self {
        TaskBrief::Research(ResearchBrief {
            title: title.into(),
            description: description.into(),
            question: None,
            hypothesis: None,
        })
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskBrief::Verify(_) => TaskType::Verify,
            TaskBrief::Research(_) | TaskBrief::ReResearch(_) => TaskType::Research,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            TaskBrief::Research(b) => &b.title,
            TaskBrief::Verify(b) => &b.title,
            TaskBrief::ReResearch(b) => &b.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            TaskBrief::Research(b) => &b.description,
            TaskBrief::Verify(b) => &b.description,
            TaskBrief::ReResearch(b) => &b.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBrief {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub question: Option<String>,
    /// Set when the task tests a hypothesis.
    #[serde(default)]
    pub hypothesis: Option<HypothesisRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisRef {
    pub hypothesis_id: String,
    pub statement: String,
    pub rationale: String,
    pub test_plan: String,
    pub based_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyBrief {
    pub title: String,
    pub description: String,
    pub pending_finding: PendingFindingSnapshot,
}

/// The finding under review, copied into the verify task at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFindingSnapshot {
    /// Store id of the pending finding.
    pub pending_finding_ref: String,
    /// `PF-nnn`
    pub finding_id: String,
    pub title: String,
    pub confidence: Confidence,
    pub source: String,
    pub implications: String,
    /// Display name of the submitter.
    pub submitted_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReResearchBrief {
    pub title: String,
    pub description: String,
    /// Store id of the rejected pending finding.
    pub pending_finding_ref: String,
    /// `PF-nnn` of the rejected attempt.
    pub previous_attempt_id: String,
    pub rejection_reasons: Vec<VerificationFeedback>,
    pub attempt: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationFeedback {
    pub verifier: String,
    pub verdict: Verdict,
    pub notes: String,
}

// ============= Assembled context =============

/// Everything the worker sees, frozen at claim time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub brief: TaskBrief,
    pub findings: TieredFindings,
    pub dead_ends: Vec<DeadEndNote>,
    pub dependency_results: Vec<DependencyResult>,
    pub parent_result: Option<String>,
    pub project_description: String,
}

/// Pyramid view of the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TieredFindings {
    /// Findings produced by direct dependencies, full detail.
    pub l2: Vec<FindingDetail>,
    /// Most recent remaining findings, 2-3 line summaries.
    pub l1: Vec<FindingSummary>,
    /// Everything else that fits, one line each.
    pub l0: Vec<FindingHeadline>,
}

impl TieredFindings {
    pub fn is_empty(&self) -> bool {
        self.l2.is_empty() && self.l1.is_empty() && self.l0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.l2.len() + self.l1.len() + self.l0.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingDetail {
    pub finding_id: String,
    pub title: String,
    pub confidence: Confidence,
    pub source: String,
    pub implications: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub finding_id: String,
    pub confidence: Confidence,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingHeadline {
    pub finding_id: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadEndNote {
    pub dead_end_id: String,
    pub what: String,
    pub why_failed: String,
    pub lesson: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyResult {
    pub task_id: String,
    pub result: String,
}
