//! Storage traits and implementations
//!
//! The sync engine writes through [`ActivityStore`]; in-memory and SQLite
//! implementations are interchangeable behind it.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryActivityStore;
pub use sqlite::SqliteActivityStore;
pub use traits::ActivityStore;
