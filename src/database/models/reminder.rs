//! Reminder model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled reminder.
///
/// Once `sent` is true it is never delivered again. Reminders are kept
/// after delivery as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    /// Sequential reminder ID shown to the user.
    pub id: i64,
    /// Owner of the reminder.
    pub user_id: u64,
    /// Chat the reminder is delivered to.
    pub chat_id: i64,
    /// Free-text payload.
    pub text: String,
    /// Unix timestamp (UTC) to fire at.
    pub fire_at: i64,
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub created_at: i64,
}

impl Reminder {
    pub fn fire_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.fire_at, 0).unwrap_or_default()
    }

    /// Due and not yet delivered.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.sent && self.fire_at <= now.timestamp()
    }
}

/// Reminder data before it gets an ID.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub user_id: u64,
    pub chat_id: i64,
    pub text: String,
    pub fire_at: DateTime<Utc>,
}
