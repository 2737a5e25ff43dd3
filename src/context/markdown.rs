//! TASK.md rendering.
//!
//! The rendered brief is stored on the task at claim time and never rewritten,
//! so this module performs no I/O and depends only on its inputs: the same
//! task and context always produce byte-identical output.

use crate::models::{AssembledContext, Task, TaskBrief, TaskType};

/// Renders the frozen brief handed to the worker.
///
/// Sections appear in a fixed order and are omitted when empty: header table,
/// research question or finding under review, previous verification feedback,
/// project context, knowledge base (L2, L1, L0), dead ends, dependency results,
/// parent result, acceptance criteria.
pub fn render_task_markdown(task: &Task, context: &AssembledContext) -> String {
    let mut out: Vec<String> = Vec::new();
    let task_type = context.brief.task_type();

    out.push("# TASK.md".into());
    out.push(String::new());
    out.push("| Field | Value |".into());
    out.push("|-------|-------|".into());
    out.push(format!("| **Task ID** | `{}` |", task.id));
    out.push(format!("| **Type** | {} |", task_type));
    out.push(format!("| **Priority** | P{} |", task.priority));
    let title = context.brief.title();
    if !title.is_empty() {
        out.push(format!("| **Title** | {} |", title));
    }
    out.push(String::new());

    match &context.brief {
        TaskBrief::Research(brief) => {
            let question = brief.question.as_deref().unwrap_or(&brief.description);
            push_section(&mut out, "## Research Question", question);
        }
        TaskBrief::ReResearch(brief) => {
            push_section(&mut out, "## Research Question", &brief.description);
        }
        TaskBrief::Verify(brief) => {
            let pf = &brief.pending_finding;
            out.push("## Finding Under Review".into());
            out.push(String::new());
            out.push("| Field | Value |".into());
            out.push("|-------|-------|".into());
            out.push(format!("| **Finding ID** | {} |", pf.finding_id));
            out.push(format!("| **Title** | {} |", pf.title));
            out.push(format!("| **Confidence** | {} |", pf.confidence));
            out.push(format!("| **Source** | {} |", pf.source));
            out.push(String::new());
            out.push(format!("**Implications:** {}", pf.implications));
            out.push(String::new());
        }
    }

    if let TaskBrief::ReResearch(brief) = &context.brief {
        if !brief.rejection_reasons.is_empty() {
            out.push("## Previous Verification Feedback".into());
            out.push(String::new());
            out.push(
                "This task was created because a previous attempt failed verification. \
                 The following feedback was provided by verifiers:"
                    .into(),
            );
            out.push(String::new());
            for feedback in &brief.rejection_reasons {
                out.push(format!("### Verifier: {}", feedback.verifier));
                out.push(format!("- **Verdict:** {}", feedback.verdict));
                out.push(format!("- **Notes:** {}", feedback.notes));
                out.push(String::new());
            }
        }
    }

    push_section(&mut out, "## Project Context", &context.project_description);

    let findings = &context.findings;
    if !findings.is_empty() {
        out.push("## Knowledge Base Context".into());
        out.push(String::new());
    }

    if !findings.l2.is_empty() {
        out.push("### Dependency Findings (Full Detail)".into());
        out.push(String::new());
        for f in &findings.l2 {
            out.push(format!("#### {}: {}", f.finding_id, f.title));
            out.push(format!("- **Confidence:** {}", f.confidence));
            out.push(format!("- **Source:** {}", f.source));
            if !f.implications.is_empty() {
                out.push(format!("- **Implications:** {}", f.implications));
            }
            out.push(String::new());
        }
    }

    if !findings.l1.is_empty() {
        out.push("### Recent Findings (Summary)".into());
        out.push(String::new());
        for f in &findings.l1 {
            out.push(format!(
                "- **{}** [{}]: {}",
                f.finding_id, f.confidence, f.summary
            ));
        }
        out.push(String::new());
    }

    if !findings.l0.is_empty() {
        out.push("### Other Findings (Brief)".into());
        out.push(String::new());
        for f in &findings.l0 {
            out.push(format!("- **{}**: {}", f.finding_id, f.summary));
        }
        out.push(String::new());
    }

    if !context.dead_ends.is_empty() {
        out.push("## Dead Ends (Do NOT Repeat)".into());
        out.push(String::new());
        for de in &context.dead_ends {
            out.push(format!("### {}: {}", de.dead_end_id, de.what));
            out.push(format!("**Why it failed:** {}", de.why_failed));
            if !de.lesson.is_empty() {
                out.push(format!("**Lesson:** {}", de.lesson));
            }
            out.push(String::new());
        }
    }

    if !context.dependency_results.is_empty() {
        out.push("## Dependency Results".into());
        out.push(String::new());
        out.push(
            "The following prerequisite tasks completed before this task was assigned:".into(),
        );
        out.push(String::new());
        for dep in &context.dependency_results {
            out.push(format!("### Task `{}`", dep.task_id));
            out.push(String::new());
            out.push(dep.result.clone());
            out.push(String::new());
        }
    }

    if let Some(parent) = &context.parent_result {
        push_section(&mut out, "## Parent Task Result", parent);
    }

    out.push("## Acceptance Criteria".into());
    out.push(String::new());
    let criteria = match task_type {
        TaskType::Research => RESEARCH_CRITERIA,
        TaskType::Verify => VERIFY_CRITERIA,
    };
    out.extend(criteria.iter().map(|c| format!("- [ ] {}", c)));
    out.push(String::new());

    out.join("\n")
}

const RESEARCH_CRITERIA: &[&str] = &[
    "Submit at least one finding with `submit_finding`",
    "Every finding includes a source citation",
    "Every finding has an honest confidence level (HIGH, MEDIUM, LOW)",
    "Record any dead ends encountered with `record_dead_end`",
    "Document reasoning process in lab notebook with `lab_notebook`",
    "Submit testable hypotheses with `submit_hypothesis` when discovered",
];

const VERIFY_CRITERIA: &[&str] = &[
    "Verify using a **different method** than the original researcher",
    "Check all cited sources for accuracy",
    "Cross-reference against existing knowledge base findings",
    "Cast vote with `cast_vote`: PASS or FAIL with detailed reasoning",
    "When unsure, cast **FAIL**",
    "Document verification process in lab notebook with `lab_notebook`",
];

/// Heading, blank line, body, blank line. Skipped when the body is empty.
fn push_section(out: &mut Vec<String>, heading: &str, body: &str) {
    if body.is_empty() {
        return;
    }
    out.push(heading.to_string());
    out.push(String::new());
    out.push(body.to_string());
    out.push(String::new());
}
