//! Scheduler behaviour against an in-memory store.

mod common;

use common::Lab;
use openlab::db::now_millis;
use openlab::models::{
    NewTask, NewTicket, TaskBrief, TaskStatus, TicketPriority, TicketType,
};
use openlab::utils::toml_config::LabConfig;
use openlab::AppError;
use rstest::rstest;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_claims_follow_priority_then_age() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    let first_p5 = lab.research_task(&project, "Survey binding tools", 5, &[]).await;
    let urgent = lab.research_task(&project, "Collect IEDB export", 2, &[]).await;
    let second_p5 = lab.research_task(&project, "Review HLA typing", 5, &[]).await;

    assert_eq!(lab.claim(&alice).await.id, urgent.id);
    assert_eq!(lab.claim(&alice).await.id, first_p5.id);
    assert_eq!(lab.claim(&alice).await.id, second_p5.id);
    assert!(lab.claim_opt(&alice).await.is_none());
}

#[tokio::test]
async fn test_dependencies_gate_claims() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    let upstream = lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let downstream = lab
        .research_task(&project, "Train binding model", 1, &[&upstream])
        .await;

    // The urgent task waits for its dependency.
    let first = lab.claim(&alice).await;
    assert_eq!(first.id, upstream.id);
    assert!(lab.claim_opt(&alice).await.is_none());

    lab.state
        .scheduler
        .complete_task(&upstream.id, &alice.id, "4,812 positive assays", 1200)
        .await
        .unwrap();

    let second = lab.claim(&alice).await;
    assert_eq!(second.id, downstream.id);

    let context = second.context.expect("claimed task carries its context");
    assert_eq!(context.dependency_results.len(), 1);
    assert_eq!(context.dependency_results[0].result, "4,812 positive assays");
    assert!(second
        .context_markdown
        .unwrap()
        .contains("4,812 positive assays"));
}

#[tokio::test]
async fn test_failed_dependency_never_unblocks() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    let upstream = lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    lab.research_task(&project, "Train binding model", 1, &[&upstream])
        .await;

    lab.claim(&alice).await;
    lab.state
        .scheduler
        .fail_task(&upstream.id, &alice.id, "export endpoint offline")
        .await
        .unwrap();

    assert!(lab.claim_opt(&alice).await.is_none());
}

#[rstest]
#[case::more_workers_than_tasks(8, 3)]
#[case::one_task_per_worker(4, 4)]
#[case::more_tasks_than_workers(3, 6)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_hand_out_each_task_once(
    #[case] worker_count: usize,
    #[case] task_count: usize,
) {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;

    let mut workers = Vec::new();
    for i in 0..worker_count {
        workers.push(lab.contributor(&format!("worker-{}", i)).await);
    }
    for i in 0..task_count {
        lab.research_task(&project, &format!("Task {}", i), 5, &[])
            .await;
    }

    let scheduler = Arc::clone(&lab.state.scheduler);
    let mut handles = Vec::new();
    for worker in workers {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.claim_task(&worker.id, None).await
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(task) = handle.await.unwrap().unwrap() {
            claimed.push(task.id);
        }
    }

    // Every caller gets a task while any remain, and never one already taken.
    let distinct: HashSet<_> = claimed.iter().collect();
    assert_eq!(claimed.len(), worker_count.min(task_count));
    assert_eq!(distinct.len(), claimed.len());
}

#[tokio::test]
async fn test_unknown_contributor_cannot_claim() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;

    let err = lab
        .state
        .scheduler
        .claim_task("nobody", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_claims_can_be_scoped_to_a_project() {
    let lab = Lab::new().await;
    let onco = lab.project("oncology").await;
    let immuno = lab.project("immunology").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&onco, "Urgent oncology task", 1, &[]).await;
    let wanted = lab.research_task(&immuno, "Immunology task", 9, &[]).await;

    let task = lab
        .state
        .scheduler
        .claim_task(&alice.id, Some(&immuno.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.id, wanted.id);
}

#[tokio::test]
async fn test_expired_lease_returns_task_with_frozen_brief() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    let bob = lab.contributor("bob").await;

    let task = lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let first = lab.claim(&alice).await;
    let brief = first.context_markdown.clone().unwrap();
    assert!(first.lease_expires_at.is_some());

    // Knowledge that arrives after the first claim must not leak into the brief.
    let other = lab.research_task(&project, "Side quest", 9, &[]).await;
    let side = lab.claim(&bob).await;
    assert_eq!(side.id, other.id);
    let pf = lab
        .submit_finding(&project, &side, &bob, "Late finding")
        .await;
    assert_eq!(pf.finding_id, "PF-001");

    let far_future = now_millis() + 10 * 3_600_000;
    let reclaimed = lab
        .state
        .scheduler
        .reclaim_expired_at(far_future)
        .await
        .unwrap();
    assert!(reclaimed.contains(&task.id));
    assert!(reclaimed.contains(&side.id));

    let released = lab.state.queries.task(&task.id).await.unwrap();
    assert_eq!(released.status, TaskStatus::Pending);
    assert!(released.assigned_to.is_none());

    // The verify tasks outrank it, but bob submitted their finding.
    let again = lab.claim(&bob).await;
    assert_eq!(again.id, task.id);
    assert_eq!(again.context_markdown.unwrap(), brief);
}

#[tokio::test]
async fn test_stale_assignee_cannot_report_after_reclaim() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    let bob = lab.contributor("bob").await;

    let task = lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    lab.claim(&alice).await;
    lab.state
        .scheduler
        .reclaim_expired_at(now_millis() + 10 * 3_600_000)
        .await
        .unwrap();
    assert_eq!(lab.claim(&bob).await.id, task.id);

    // alice lost the lease; her late report must not land on bob's claim.
    let scheduler = &lab.state.scheduler;
    let err = scheduler
        .complete_task(&task.id, &alice.id, "alice's stale result", 100)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(scheduler
        .fail_task(&task.id, &alice.id, "timed out")
        .await
        .is_err());

    let stored = lab.state.queries.task(&task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Assigned);
    assert_eq!(stored.assigned_to.as_deref(), Some(bob.id.as_str()));
    assert!(stored.result.is_none());

    let done = scheduler
        .complete_task(&task.id, &bob.id, "4,812 positive assays", 700)
        .await
        .unwrap();
    assert_eq!(done.result.as_deref(), Some("4,812 positive assays"));

    let alice = lab.state.queries.contributor(&alice.id).await.unwrap();
    let bob = lab.state.queries.contributor(&bob.id).await.unwrap();
    assert_eq!((alice.tasks_completed, alice.tokens_contributed), (0, 0));
    assert_eq!((bob.tasks_completed, bob.tokens_contributed), (1, 700));
}

#[tokio::test]
async fn test_heartbeat_extends_lease_for_assignee_only() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;
    let bob = lab.contributor("bob").await;

    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let task = lab.claim(&alice).await;

    let extended = lab
        .state
        .scheduler
        .heartbeat(&task.id, &alice.id)
        .await
        .unwrap()
        .unwrap();
    assert!(extended >= task.lease_expires_at.unwrap());

    let err = lab
        .state
        .scheduler
        .heartbeat(&task.id, &bob.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_leases_can_be_disabled() {
    let mut config = LabConfig::default();
    config.scheduler.lease_secs = 0;
    let lab = Lab::with_config(config).await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let task = lab.claim(&alice).await;
    assert!(task.lease_expires_at.is_none());

    let reclaimed = lab
        .state
        .scheduler
        .reclaim_expired_at(now_millis() + 365 * 24 * 3_600_000)
        .await
        .unwrap();
    assert!(reclaimed.is_empty());
    assert_eq!(
        lab.state.scheduler.heartbeat(&task.id, &alice.id).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_cycles_are_blocked_not_claimed() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    // The API cannot express a cycle, so write the rows directly.
    let now = now_millis();
    let mut a = NewTask {
        project_id: project.id.clone(),
        parent_id: None,
        priority: 1,
        depends_on: vec![],
        brief: TaskBrief::research("A", "first half of the loop"),
    }
    .into_task(now);
    let mut b = NewTask {
        project_id: project.id.clone(),
        parent_id: None,
        priority: 1,
        depends_on: vec![],
        brief: TaskBrief::research("B", "second half of the loop"),
    }
    .into_task(now);
    a.depends_on = vec![b.id.clone()];
    b.depends_on = vec![a.id.clone()];
    {
        let tx = lab.state.store.begin().await.unwrap();
        tx.insert_task(&a).await.unwrap();
        tx.insert_task(&b).await.unwrap();
        tx.commit().await.unwrap();
    }
    let free = lab.research_task(&project, "Independent", 9, &[]).await;

    assert_eq!(lab.claim(&alice).await.id, free.id);
    assert_eq!(
        lab.state.queries.task(&a.id).await.unwrap().status,
        TaskStatus::Blocked
    );
    assert_eq!(
        lab.state.queries.task(&b.id).await.unwrap().status,
        TaskStatus::Blocked
    );
}

#[tokio::test]
async fn test_complete_credits_contributor() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let task = lab.claim(&alice).await;
    let done = lab
        .state
        .scheduler
        .complete_task(&task.id, &alice.id, "done", 3400)
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.completed_at.is_some());

    let alice = lab.state.queries.contributor(&alice.id).await.unwrap();
    assert_eq!(alice.tasks_completed, 1);
    assert_eq!(alice.tokens_contributed, 3400);

    // A finished task cannot be completed twice.
    let err = lab
        .state
        .scheduler
        .complete_task(&task.id, &alice.id, "again", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_fail_records_structured_payload() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&project, "Collect IEDB export", 5, &[]).await;
    let task = lab.claim(&alice).await;
    let failed = lab
        .state
        .scheduler
        .fail_task(&task.id, &alice.id, "rate limited")
        .await
        .unwrap();

    assert_eq!(failed.status, TaskStatus::Failed);
    let payload: serde_json::Value = serde_json::from_str(&failed.result.unwrap()).unwrap();
    assert_eq!(payload["error"], "rate limited");
    assert_eq!(payload["status"], "FAILED");
}

#[tokio::test]
async fn test_suspend_until_ticket_resolved() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;
    let alice = lab.contributor("alice").await;

    lab.research_task(&project, "Run docking", 5, &[]).await;
    let task = lab.claim(&alice).await;

    let ticket = lab
        .state
        .escalation
        .create_ticket(NewTicket {
            task_id: task.id.clone(),
            ticket_type: TicketType::GpuJob,
            priority: TicketPriority::High,
            question: "Run AlphaFold on 40 peptide-MHC complexes".to_string(),
            context: String::new(),
            routing_tags: vec!["gpu".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(ticket.ticket_id, "JOB-001");

    let suspended = lab
        .state
        .scheduler
        .suspend_task(&task.id, &alice.id, &ticket.id, serde_json::json!({"step": 3}))
        .await
        .unwrap();
    assert_eq!(suspended.status, TaskStatus::Suspended);
    assert_eq!(
        suspended.saved_state.as_ref().unwrap().suspended_on_ticket,
        ticket.id
    );

    // Not resumable while the ticket is open.
    assert!(lab
        .state
        .scheduler
        .resumable_tasks(&alice.id)
        .await
        .unwrap()
        .is_empty());
    assert!(lab.state.scheduler.resume_task(&task.id).await.is_err());

    lab.state
        .escalation
        .resolve_ticket(&ticket.id, "structures uploaded to s3://lab/af2", None)
        .await
        .unwrap();

    let resumable = lab.state.scheduler.resumable_tasks(&alice.id).await.unwrap();
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].id, task.id);

    let resumed = lab.state.scheduler.resume_task(&task.id).await.unwrap();
    assert_eq!(resumed.status, TaskStatus::Assigned);
    assert_eq!(resumed.assigned_to.as_deref(), Some(alice.id.as_str()));
    assert_eq!(resumed.context_markdown, task.context_markdown);
}

#[tokio::test]
async fn test_create_task_validates_references() {
    let lab = Lab::new().await;
    let project = lab.project("neoantigen").await;

    let err = lab
        .state
        .scheduler
        .create_task(NewTask {
            project_id: project.id.clone(),
            parent_id: None,
            priority: 5,
            depends_on: vec!["missing".to_string()],
            brief: TaskBrief::research("Orphan", ""),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = lab
        .state
        .scheduler
        .create_task(NewTask {
            project_id: project.id.clone(),
            parent_id: None,
            priority: 5,
            depends_on: vec![],
            brief: TaskBrief::research("   ", ""),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
