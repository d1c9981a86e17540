//! Persistence layer — expiring job snapshots plus per-job pub/sub.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use memory::{InMemoryStore, spawn_purge_task};
pub use traits::JobStore;
