//! Persistence layer: libSQL-backed campaigns, leads and dispatch log.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, DispatchRecord};
