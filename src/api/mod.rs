//! HTTP API Handlers and Routes
//!
//! JSON boundary for remote workers and dashboards, built on axum. Every
//! route maps onto one engine or query method; errors come back as
//! `{"error": "..."}` with the status taken from [`AppError`](crate::AppError).
//!
//! # API Endpoints
//!
//! ## Tasks (`/api/tasks`)
//! - `POST /api/tasks` - Create a task
//! - `GET /api/tasks/available` - PENDING tasks in claim order
//! - `POST /api/tasks/claim` - Claim the next eligible task
//! - `POST /api/tasks/reclaim` - Return expired leases to the backlog
//! - `POST /api/tasks/{id}/complete`, `/fail`, `/suspend`, `/resume`, `/heartbeat`
//! - `GET|POST /api/tasks/{id}/notebook` - Lab notebook entries
//!
//! ## Knowledge
//! - `POST /api/findings` - Submit a finding for verification
//! - `POST /api/pending-findings/{id}/votes` - Cast a verification vote
//! - `POST /api/dead-ends` - Record a dead end
//! - `POST /api/hypotheses`, `POST /api/hypotheses/{id}/resolve`
//!
//! ## Tickets (`/api/tickets`)
//! - `GET /api/tickets?project_id=&tags=gpu,a100` - Open tickets
//! - `POST /api/tickets`, `/api/tickets/{id}/claim`, `/resolve`, `/expire`
//!
//! ## Lab
//! - `GET /api/health`, `GET /api/stats`
//! - `/api/projects/...` listings, `/api/contributors/...`

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
