//! Request handlers, grouped by area.

/// Projects, contributors, stats and listings.
pub mod lab;
/// Findings, votes, dead ends and hypotheses.
pub mod knowledge;
/// Escalation tickets and lab notebook entries.
pub mod tickets;
/// Task lifecycle.
pub mod tasks;
