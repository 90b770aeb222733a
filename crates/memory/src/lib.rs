//! Conversation store implementations for askgate.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryTurnStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTurnStore;
