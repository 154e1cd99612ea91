//! User profile model.
//!
//! Stores Telegram identity, subscription plan, preferences and the
//! embedded daily usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::usage::UsageCounters;
use crate::limits::Tier;

fn default_persona() -> String {
    "default".to_string()
}

/// Stored user profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    /// Telegram user ID.
    pub user_id: u64,
    /// Username without @.
    #[serde(default)]
    pub username: Option<String>,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Preferred interface language (`ru` or `en`).
    #[serde(default)]
    pub language: Option<String>,
    /// Chat persona key.
    #[serde(default = "default_persona")]
    pub persona: String,

    // --- Subscription ---
    /// Stored plan, unknown values read as FREE.
    #[serde(default)]
    pub plan: Tier,
    /// Unix timestamp when the plan lapses. None means permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_expires_at: Option<i64>,

    /// Daily counters, reset on UTC day rollover.
    #[serde(default)]
    pub usage: UsageCounters,

    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl UserProfile {
    /// Create a fresh FREE profile.
    pub fn new(user_id: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            user_id,
            username: None,
            first_name: String::new(),
            language: None,
            persona: default_persona(),
            plan: Tier::Free,
            plan_expires_at: None,
            usage: UsageCounters::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn plan_expiry(&self) -> Option<DateTime<Utc>> {
        self.plan_expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    /// Tier in force at `now`, with expired plans resolved as FREE.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        self.plan.effective(self.plan_expiry(), now)
    }
}
