//! # OpenLab Core
//!
//! Task orchestration and verification consensus for distributed research
//! workers. Workers pull work from a shared, dependency-aware backlog, execute
//! it outside the core, and report findings that only enter the knowledge base
//! after three independent verifiers agree.
//!
//! ## Overview
//!
//! OpenLab can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `openlab-server` binary
//! 2. **As a library** - Embed the engines in your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use openlab::{AppState, EntityStore, LabConfigManager, LabConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> openlab::Result<()> {
//!     let store = Arc::new(EntityStore::new_memory().await?);
//!     let config = Arc::new(LabConfigManager::from_config(LabConfig::default()));
//!     let state = AppState::new(store, config);
//!
//!     if let Some(task) = state.scheduler.claim_task("contributor-id", None).await? {
//!         println!("{}", task.context_markdown.unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `local-db` | Local SQLite database (default) |
//! | `turso` | Remote Turso database |
//!
//! ## Modules
//!
//! - [`db`] - Entity store, identifier allocation
//! - [`scheduler`] - Claiming and the task lifecycle
//! - [`context`] - Pyramid context and the frozen task brief
//! - [`verification`] - Three-vote finding consensus
//! - [`hypotheses`] - Hypothesis intake
//! - [`escalation`] - Tickets for work that needs a human
//! - [`worker`] - Client-side claim/execute/report loop
//! - [`api`] - REST API handlers and routes
//!
//! ## Configuration
//!
//! `openlab.toml` holds server, database, scheduler, context and worker
//! settings and is hot-reloaded while the server runs.

#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// Pyramid context assembly and brief rendering.
pub mod context;
/// Entity store (libsql).
pub mod db;
/// Escalation tickets.
pub mod escalation;
/// Hypothesis engine.
pub mod hypotheses;
/// Entities and their wire enums.
pub mod models;
/// Per-task lab notebook.
pub mod notebook;
/// Read-only queries.
pub mod queries;
/// Projects and contributors.
pub mod registry;
/// Task scheduler.
pub mod scheduler;
/// Errors.
pub mod types;
/// Configuration utilities.
pub mod utils;
/// Verification consensus engine.
pub mod verification;
/// Worker loop and the executor seam.
pub mod worker;

// Re-export commonly used types
pub use db::{DatabaseProvider, EntityStore};
pub use escalation::EscalationEngine;
pub use hypotheses::HypothesisEngine;
pub use notebook::LabNotebook;
pub use queries::LabQueries;
pub use registry::LabRegistry;
pub use scheduler::TaskScheduler;
pub use types::{AppError, Result};
pub use utils::toml_config::{LabConfig, LabConfigManager};
pub use verification::{ConsensusEngine, VoteOutcome};
pub use worker::{AgentExecutor, ExecutionOutput, WorkerLoop};

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<LabConfigManager>,
    /// The entity store every engine works against
    pub store: Arc<EntityStore>,
    pub scheduler: Arc<TaskScheduler>,
    pub consensus: Arc<ConsensusEngine>,
    pub hypotheses: Arc<HypothesisEngine>,
    pub escalation: Arc<EscalationEngine>,
    pub notebook: Arc<LabNotebook>,
    pub registry: Arc<LabRegistry>,
    pub queries: Arc<LabQueries>,
}

impl AppState {
    /// Builds every engine over one store and configuration.
    pub fn new(store: Arc<EntityStore>, config_manager: Arc<LabConfigManager>) -> Self {
        Self {
            scheduler: Arc::new(TaskScheduler::new(
                Arc::clone(&store),
                Arc::clone(&config_manager),
            )),
            consensus: Arc::new(ConsensusEngine::new(
                Arc::clone(&store),
                Arc::clone(&config_manager),
            )),
            hypotheses: Arc::new(HypothesisEngine::new(
                Arc::clone(&store),
                Arc::clone(&config_manager),
            )),
            escalation: Arc::new(EscalationEngine::new(Arc::clone(&store))),
            notebook: Arc::new(LabNotebook::new(Arc::clone(&store))),
            registry: Arc::new(LabRegistry::new(Arc::clone(&store))),
            queries: Arc::new(LabQueries::new(Arc::clone(&store))),
            store,
            config_manager,
        }
    }
}
