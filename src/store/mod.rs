//! Persistence layer: libSQL-backed storage for workout and nutrition history.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Collection, Database, Document, HistoryRecord};
