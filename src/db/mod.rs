//! Entity store.
//!
//! A single libsql database holds every OpenLab entity. The store is the only
//! component that mutates state; engines open a transaction with
//! [`EntityStore::begin`], call the repository methods on [`StoreConn`], and
//! finish it with [`StoreConn::finish`].
//!
//! Backends:
//! - in-memory SQLite (tests)
//! - local SQLite file (default)
//! - remote Turso, behind the `turso` feature

pub mod ids;
mod knowledge;
mod people;
pub mod provider;
mod schema;
pub mod store;
mod tasks;
mod tickets;

pub use ids::IdKind;
pub use provider::DatabaseProvider;
pub use store::{now_millis, EntityStore, StoreConn};
pub use tasks::TaskNode;
