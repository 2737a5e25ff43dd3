use super::store::{int, StoreConn};
use crate::types::{AppError, Result};

/// Kinds of human-readable identifier, each with its own per-project sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Finding,
    PendingFinding,
    DeadEnd,
    Hypothesis,
    Job,
}

impl IdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Finding => "F",
            IdKind::PendingFinding => "PF",
            IdKind::DeadEnd => "DE",
            IdKind::Hypothesis => "H",
            IdKind::Job => "JOB",
        }
    }

    /// Table whose row count seeds the sequence on first use.
    fn table(&self) -> &'static str {
        match self {
            IdKind::Finding => "findings",
            IdKind::PendingFinding => "pending_findings",
            IdKind::DeadEnd => "dead_ends",
            IdKind::Hypothesis => "hypotheses",
            IdKind::Job => "tickets",
        }
    }
}

pub fn format_id(kind: IdKind, n: i64) -> String {
    format!("{}-{:03}", kind.prefix(), n)
}

impl StoreConn<'_> {
    /// Allocates the next identifier of `kind` for `project_id`.
    ///
    /// Must run inside the transaction that inserts the entity, so that a
    /// rolled-back insert also rolls back the allocation.
    pub async fn allocate_id(&self, project_id: &str, kind: IdKind) -> Result<String> {
        if !self.in_transaction() {
            return Err(AppError::Internal(format!(
                "{} id allocated outside a transaction",
                kind.prefix()
            )));
        }

        let seed = format!(
            "INSERT INTO id_sequences (project_id, kind, last_value)
             VALUES (?1, ?2, (SELECT COUNT(*) FROM {} WHERE project_id = ?1))
             ON CONFLICT(project_id, kind) DO NOTHING",
            kind.table()
        );
        self.execute(&seed, (project_id, kind.prefix())).await?;

        let next = self
            .query_opt(
                "UPDATE id_sequences SET last_value = last_value + 1
                 WHERE project_id = ?1 AND kind = ?2
                 RETURNING last_value",
                (project_id, kind.prefix()),
                |row| int(row, 0),
            )
            .await?
            .ok_or_else(|| AppError::Database("id sequence row missing".to_string()))?;

        Ok(format_id(kind, next))
    }
}
