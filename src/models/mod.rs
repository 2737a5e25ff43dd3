//! Entity types owned by the store.
//!
//! Enumerations are persisted as their upper-case wire names (`"PENDING"`,
//! `"VERIFY"`, ...), which are also what the HTTP API speaks.

pub mod context;

use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};

pub use context::{
    AssembledContext, DeadEndNote, DependencyResult, FindingDetail, FindingHeadline,
    FindingSummary, HypothesisRef, PendingFindingSnapshot, ReResearchBrief, ResearchBrief,
    TaskBrief, TieredFindings, VerificationFeedback, VerifyBrief,
};

/// Declares a string-backed enum with its wire names.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(AppError::Database(format!(
                        "unknown {} value '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum!(
    /// RESEARCH investigates, VERIFY audits a submitted finding.
    TaskType {
        Research => "RESEARCH",
        Verify => "VERIFY",
    }
);

wire_enum!(
    TaskStatus {
        Pending => "PENDING",
        Assigned => "ASSIGNED",
        Suspended => "SUSPENDED",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Blocked => "BLOCKED",
    }
);

wire_enum!(
    Confidence {
        High => "HIGH",
        Medium => "MEDIUM",
        Low => "LOW",
    }
);

wire_enum!(
    Verdict {
        Pass => "PASS",
        Fail => "FAIL",
    }
);

wire_enum!(
    PendingFindingStatus {
        PendingVerification => "PENDING_VERIFICATION",
        Verified => "VERIFIED",
        Rejected => "REJECTED",
        ReResearching => "RE_RESEARCHING",
    }
);

wire_enum!(
    HypothesisStatus {
        Proposed => "PROPOSED",
        Testing => "TESTING",
        Supported => "SUPPORTED",
        Refuted => "REFUTED",
        Abandoned => "ABANDONED",
    }
);

wire_enum!(
    /// Terminal outcomes accepted by `resolve_hypothesis`.
    HypothesisVerdict {
        Supported => "SUPPORTED",
        Refuted => "REFUTED",
        Abandoned => "ABANDONED",
    }
);

impl From<HypothesisVerdict> for HypothesisStatus {
    fn from(verdict: HypothesisVerdict) -> Self {
        match verdict {
            HypothesisVerdict::Supported => HypothesisStatus::Supported,
            HypothesisVerdict::Refuted => HypothesisStatus::Refuted,
            HypothesisVerdict::Abandoned => HypothesisStatus::Abandoned,
        }
    }
}

wire_enum!(
    TicketType {
        GpuJob => "GPU_JOB",
        ScientistQuestion => "SCIENTIST_QUESTION",
        HumanTask => "HUMAN_TASK",
        DataAccess => "DATA_ACCESS",
        Compute => "COMPUTE",
    }
);

wire_enum!(
    TicketPriority {
        Urgent => "URGENT",
        High => "HIGH",
        Normal => "NORMAL",
    }
);

wire_enum!(
    TicketStatus {
        Open => "OPEN",
        Claimed => "CLAIMED",
        Resolved => "RESOLVED",
        Expired => "EXPIRED",
    }
);

wire_enum!(
    ProjectStatus {
        Active => "ACTIVE",
        Paused => "PAUSED",
        Completed => "COMPLETED",
    }
);

wire_enum!(
    Visibility {
        Public => "PUBLIC",
        Private => "PRIVATE",
    }
);

wire_enum!(
    NotebookEntryType {
        Observation => "OBSERVATION",
        Reasoning => "REASONING",
        Hypothesis => "HYPOTHESIS",
        Result => "RESULT",
        Decision => "DECISION",
    }
);

// ============= Projects & Contributors =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub field: String,
    pub visibility: Visibility,
    pub status: ProjectStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub field: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: String,
    pub display_name: String,
    /// Capability/provider tag of the worker runtime (e.g. `"claude"`).
    pub provider: String,
    pub capabilities: Vec<String>,
    pub tasks_completed: i64,
    pub tokens_contributed: i64,
    pub joined_at: i64,
    pub last_active_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContributor {
    pub display_name: String,
    pub provider: String,
    /// Defaults to `["cpu"]` when empty.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

// ============= Tasks =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub task_type: TaskType,
    /// Lower is more urgent.
    pub priority: i32,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    pub assigned_to: Option<String>,
    /// Seed context set at creation.
    pub brief: TaskBrief,
    /// Assembled at claim time, never rewritten afterwards.
    pub context: Option<AssembledContext>,
    /// Frozen rendering of `context`; the audit record of what the worker saw.
    pub context_markdown: Option<String>,
    pub result: Option<String>,
    pub saved_state: Option<SavedState>,
    pub claimed_at: Option<i64>,
    pub lease_expires_at: Option<i64>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl Task {
    pub fn title(&self) -> &str {
        self.brief.title()
    }

    /// The pending finding under review, for VERIFY tasks.
    pub fn pending_finding_ref(&self) -> Option<&str> {
        match &self.brief {
            TaskBrief::Verify(v) => Some(v.pending_finding.pending_finding_ref.as_str()),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Input for creating a task. The task type follows from the brief variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub priority: i32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub brief: TaskBrief,
}

impl NewTask {
    /// A fresh PENDING task row with a new id.
    pub fn into_task(self, now: i64) -> Task {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: self.project_id,
            parent_id: self.parent_id,
            task_type: self.brief.task_type(),
            priority: self.priority,
            status: TaskStatus::Pending,
            depends_on: self.depends_on,
            assigned_to: None,
            brief: self.brief,
            context: None,
            context_markdown: None,
            result: None,
            saved_state: None,
            claimed_at: None,
            lease_expires_at: None,
            created_at: now,
            completed_at: None,
        }
    }
}

/// Snapshot kept on a SUSPENDED task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    /// Ticket that must be RESOLVED before the task can resume.
    pub suspended_on_ticket: String,
    #[serde(default)]
    pub snapshot: serde_json::Value,
    pub suspended_at: i64,
}

/// Structured failure payload stored as a task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub error: String,
    pub status: TaskStatus,
}

impl FailureReport {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: TaskStatus::Failed,
        }
    }

    pub fn to_result_string(&self) -> String {
        serde_json::json!({ "error": self.error, "status": self.status.as_str() }).to_string()
    }
}

// ============= Knowledge =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub verifier: String,
    pub verdict: Verdict,
    pub notes: String,
    pub voted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFinding {
    pub id: String,
    pub project_id: String,
    /// `PF-nnn`
    pub finding_id: String,
    pub title: String,
    pub confidence: Confidence,
    pub source: String,
    pub implications: String,
    pub submitted_by: String,
    pub submitted_by_task: String,
    pub attempt: i64,
    pub verify_task_ids: Vec<String>,
    pub votes: Vec<Vote>,
    pub status: PendingFindingStatus,
    pub rejection_context: Option<String>,
    pub submitted_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFinding {
    pub project_id: String,
    pub title: String,
    pub confidence: Confidence,
    pub source: String,
    #[serde(default)]
    pub implications: String,
    pub task_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub project_id: String,
    /// `F-nnn`
    pub finding_id: String,
    pub title: String,
    pub confidence: Confidence,
    pub source: String,
    pub implications: String,
    pub summary_l0: Option<String>,
    pub summary_l1: Option<String>,
    pub created_by_task: String,
    pub created_by: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadEnd {
    pub id: String,
    pub project_id: String,
    /// `DE-nnn`
    pub dead_end_id: String,
    pub what: String,
    pub why_failed: String,
    pub iterations_spent: i64,
    pub lesson: String,
    pub created_by_task: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeadEnd {
    pub project_id: String,
    pub what: String,
    pub why_failed: String,
    #[serde(default)]
    pub iterations_spent: i64,
    #[serde(default)]
    pub lesson: String,
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub project_id: String,
    /// `H-nnn`
    pub hypothesis_id: String,
    pub statement: String,
    pub rationale: String,
    pub test_plan: String,
    pub based_on: Vec<String>,
    pub status: HypothesisStatus,
    pub test_task_id: Option<String>,
    pub result: Option<String>,
    pub created_by_task: String,
    pub created_by: String,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHypothesis {
    pub project_id: String,
    pub statement: String,
    #[serde(default)]
    pub rationale: String,
    pub test_plan: String,
    #[serde(default)]
    pub based_on: Vec<String>,
    pub task_id: String,
    pub user_id: String,
}

// ============= Escalation =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub project_id: String,
    /// `JOB-nnn`
    pub ticket_id: String,
    pub created_by_task: String,
    pub ticket_type: TicketType,
    pub priority: TicketPriority,
    pub question: String,
    pub context: String,
    pub routing_tags: Vec<String>,
    pub status: TicketStatus,
    pub result: Option<String>,
    pub claimed_by: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub task_id: String,
    pub ticket_type: TicketType,
    pub priority: TicketPriority,
    pub question: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub routing_tags: Vec<String>,
}

// ============= Lab Notebook =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookEntry {
    pub task_id: String,
    pub project_id: String,
    pub contributor_id: Option<String>,
    pub entry_type: NotebookEntryType,
    pub content: String,
    pub recorded_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        assert_eq!(TaskStatus::from_str("ASSIGNED").unwrap(), TaskStatus::Assigned);
        assert_eq!(
            PendingFindingStatus::ReResearching.as_str(),
            "RE_RESEARCHING"
        );
        assert!(TaskStatus::from_str("assigned").is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&TicketType::GpuJob).unwrap();
        assert_eq!(json, "\"GPU_JOB\"");
        let verdict: Verdict = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(verdict, Verdict::Fail);
    }

    #[test]
    fn test_failure_report_payload() {
        let payload = FailureReport::new("executor crashed").to_result_string();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["error"], "executor crashed");
        assert_eq!(value["status"], "FAILED");
    }
}
