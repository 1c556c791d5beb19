//! Jarvis Storage crate - session persistence.
//!
//! Provides the `SessionStore` surface (list/get/put/delete) with a
//! process-lifetime in-memory implementation and a WAL-mode SQLite
//! implementation backed by migrations.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod store;

pub use db::Database;
pub use memory::MemorySessionStore;
pub use repository::SessionRepository;
pub use store::SessionStore;
