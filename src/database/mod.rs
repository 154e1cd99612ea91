//! Persistence: models, storage traits and their MongoDB and in-memory backends.

mod memory;
mod models;
mod mongo;
mod repository;
mod store;

pub use memory::MemoryStore;
pub use models::*;
pub use mongo::Database;
pub use repository::{HistoryRepository, ReminderRepository, UserRepository};
pub use store::{HistoryStore, ReminderStore, StoreError, StoreResult, UserIdentity, UserStore};
