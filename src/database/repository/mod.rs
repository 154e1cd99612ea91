//! MongoDB repositories behind the storage traits.

mod history_repository;
mod reminder_repository;
mod user_repository;

pub use history_repository::HistoryRepository;
pub use reminder_repository::ReminderRepository;
pub use user_repository::UserRepository;
