//! SQLite storage backend

pub mod init;
mod store;

pub use init::{init_database, init_memory_database};
pub use store::SqliteStore;
