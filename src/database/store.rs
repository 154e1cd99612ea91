//! Storage seams.
//!
//! Handlers only see these traits. `MongoStore` repositories back them in
//! production and `MemoryStore` backs them in tests and in `STORAGE=memory`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use super::models::{
    HistoryMessage, MessageKind, NewReminder, PlatformStats, Reminder, Role, UsageCounters, UserProfile,
};
use crate::error::BotError;
use crate::limits::{Tier, UsageKind};

/// The durable store could not be reached or answered nonsense.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("unexpected empty result for {0}")]
    Missing(&'static str),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<StoreError> for BotError {
    fn from(err: StoreError) -> Self {
        BotError::StoreUnavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Telegram identity fields refreshed on every update.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: u64,
    pub username: Option<String>,
    pub first_name: String,
    pub language_code: Option<String>,
}

/// Users, plans and daily counters.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the user on first sight, refresh identity otherwise.
    async fn upsert_identity(&self, identity: &UserIdentity) -> StoreResult<()>;

    async fn get(&self, user_id: u64) -> StoreResult<Option<UserProfile>>;

    async fn set_plan(&self, user_id: u64, tier: Tier, expires_at: Option<DateTime<Utc>>) -> StoreResult<()>;

    async fn set_persona(&self, user_id: u64, persona: &str) -> StoreResult<()>;

    async fn set_language(&self, user_id: u64, language: &str) -> StoreResult<()>;

    /// Reset stale counters, then read them. Atomic per user.
    async fn usage_on(&self, user_id: u64, today: NaiveDate) -> StoreResult<UsageCounters>;

    /// Reset stale counters, then add `amount` to `kind`. Atomic per user.
    ///
    /// Returns the counters after the increment.
    async fn add_usage(
        &self,
        user_id: u64,
        kind: UsageKind,
        amount: u32,
        today: NaiveDate,
    ) -> StoreResult<UsageCounters>;

    /// Totals over every known user as of `now`.
    async fn stats(&self, now: DateTime<Utc>) -> StoreResult<PlatformStats>;

    /// Every known user, for broadcasts.
    async fn user_ids(&self) -> StoreResult<Vec<u64>>;

    /// Round trip to the backing store.
    async fn ping(&self) -> StoreResult<()>;
}

/// Scheduled reminders.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn insert(&self, reminder: NewReminder) -> StoreResult<Reminder>;

    /// Unsent reminders with `fire_at <= now`, oldest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Reminder>>;

    /// Flag as sent. Returns false if it already was.
    async fn mark_sent(&self, id: i64) -> StoreResult<bool>;

    /// Unsent reminders of one user, soonest first.
    async fn pending_for(&self, user_id: u64) -> StoreResult<Vec<Reminder>>;

    /// Unsent reminders across all users.
    async fn count_pending(&self) -> StoreResult<u64>;
}

/// Conversation context for chat completions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn push(&self, user_id: u64, role: Role, content: &str, kind: MessageKind) -> StoreResult<()>;

    /// Last `limit` messages in chronological order.
    async fn recent(&self, user_id: u64, limit: usize) -> StoreResult<Vec<HistoryMessage>>;

    /// Returns how many messages were removed.
    async fn clear(&self, user_id: u64) -> StoreResult<u64>;
}
