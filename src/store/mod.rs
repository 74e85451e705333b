//! Persistence layer: libSQL or in-memory storage for session snapshots.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod session_store;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryDatabase;
pub use session_store::SessionStore;
pub use traits::Database;
