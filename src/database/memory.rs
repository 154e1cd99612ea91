//! In-process store.
//!
//! Implements every storage trait with concurrent maps. Used by tests and
//! by `STORAGE=memory` for running the bot without MongoDB.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::models::{
    HistoryMessage, MessageKind, NewReminder, PlatformStats, Reminder, Role, UsageCounters, UserProfile,
};
use super::store::{HistoryStore, ReminderStore, StoreResult, UserIdentity, UserStore};
use crate::limits::{Tier, UsageKind};

/// Memory-backed store.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<u64, UserProfile>,
    reminders: Mutex<Vec<Reminder>>,
    next_reminder_id: AtomicI64,
    history: DashMap<u64, Vec<HistoryMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_identity(&self, identity: &UserIdentity) -> StoreResult<()> {
        let mut user = self
            .users
            .entry(identity.user_id)
            .or_insert_with(|| UserProfile::new(identity.user_id));
        user.username = identity.username.clone();
        user.first_name = identity.first_name.clone();
        if user.language.is_none() {
            user.language = identity.language_code.clone();
        }
        user.updated_at = Utc::now().timestamp();
        Ok(())
    }

    async fn get(&self, user_id: u64) -> StoreResult<Option<UserProfile>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn set_plan(&self, user_id: u64, tier: Tier, expires_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        let mut user = self.users.entry(user_id).or_insert_with(|| UserProfile::new(user_id));
        user.plan = tier;
        user.plan_expires_at = expires_at.map(|t| t.timestamp());
        Ok(())
    }

    async fn set_persona(&self, user_id: u64, persona: &str) -> StoreResult<()> {
        let mut user = self.users.entry(user_id).or_insert_with(|| UserProfile::new(user_id));
        user.persona = persona.to_string();
        Ok(())
    }

    async fn set_language(&self, user_id: u64, language: &str) -> StoreResult<()> {
        let mut user = self.users.entry(user_id).or_insert_with(|| UserProfile::new(user_id));
        user.language = Some(language.to_string());
        Ok(())
    }

    async fn usage_on(&self, user_id: u64, today: NaiveDate) -> StoreResult<UsageCounters> {
        // The entry guard holds the shard lock for the whole reset-then-read
        let mut user = self.users.entry(user_id).or_insert_with(|| UserProfile::new(user_id));
        user.usage.roll_over(today);
        Ok(user.usage.clone())
    }

    async fn add_usage(
        &self,
        user_id: u64,
        kind: UsageKind,
        amount: u32,
        today: NaiveDate,
    ) -> StoreResult<UsageCounters> {
        let mut user = self.users.entry(user_id).or_insert_with(|| UserProfile::new(user_id));
        user.usage.roll_over(today);
        user.usage.add(kind, amount);
        Ok(user.usage.clone())
    }

    async fn stats(&self, now: DateTime<Utc>) -> StoreResult<PlatformStats> {
        let mut stats = PlatformStats::default();
        for user in self.users.iter() {
            stats.count(user.value(), now);
        }
        Ok(stats)
    }

    async fn user_ids(&self) -> StoreResult<Vec<u64>> {
        let mut ids: Vec<u64> = self.users.iter().map(|user| *user.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn insert(&self, reminder: NewReminder) -> StoreResult<Reminder> {
        let id = self.next_reminder_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = Reminder {
            id,
            user_id: reminder.user_id,
            chat_id: reminder.chat_id,
            text: reminder.text,
            fire_at: reminder.fire_at.timestamp(),
            sent: false,
            created_at: Utc::now().timestamp(),
        };
        self.reminders.lock().push(stored.clone());
        Ok(stored)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Reminder>> {
        let mut due: Vec<Reminder> = self
            .reminders
            .lock()
            .iter()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.fire_at, r.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_sent(&self, id: i64) -> StoreResult<bool> {
        let mut reminders = self.reminders.lock();
        match reminders.iter_mut().find(|r| r.id == id && !r.sent) {
            Some(reminder) => {
                reminder.sent = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pending_for(&self, user_id: u64) -> StoreResult<Vec<Reminder>> {
        let mut pending: Vec<Reminder> = self
            .reminders
            .lock()
            .iter()
            .filter(|r| r.user_id == user_id && !r.sent)
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.fire_at, r.id));
        Ok(pending)
    }

    async fn count_pending(&self) -> StoreResult<u64> {
        Ok(self.reminders.lock().iter().filter(|r| !r.sent).count() as u64)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn push(&self, user_id: u64, role: Role, content: &str, kind: MessageKind) -> StoreResult<()> {
        self.history.entry(user_id).or_default().push(HistoryMessage {
            user_id,
            role,
            content: content.to_string(),
            kind,
            created_at: Utc::now().timestamp_millis(),
        });
        Ok(())
    }

    async fn recent(&self, user_id: u64, limit: usize) -> StoreResult<Vec<HistoryMessage>> {
        Ok(self
            .history
            .get(&user_id)
            .map(|messages| {
                let skip = messages.len().saturating_sub(limit);
                messages[skip..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: u64) -> StoreResult<u64> {
        Ok(self
            .history
            .remove(&user_id)
            .map(|(_, messages)| messages.len() as u64)
            .unwrap_or(0))
    }
}
