//! Database model exports.

pub mod history;
pub mod reminder;
pub mod stats;
pub mod usage;
pub mod user;

pub use history::{HistoryMessage, MessageKind, Role};
pub use reminder::{NewReminder, Reminder};
pub use stats::PlatformStats;
pub use usage::UsageCounters;
pub use user::UserProfile;
