//! Reminder delivery loop.
//!
//! Every sweep claims due reminders by marking them sent, then delivers
//! them. A reminder is therefore delivered at most once, and a failed
//! delivery is logged, not retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, error, info, warn};

use super::dispatcher::ThrottledBot;
use crate::database::{Reminder, ReminderStore, UserStore};
use crate::i18n::{self, t};
use crate::limits::RateLimiter;
use crate::utils::html_escape;

/// Reminders delivered per sweep at most.
const SWEEP_BATCH: usize = 100;

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Outbound text channel.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl ReplyChannel for ThrottledBot {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Periodic sweep over the reminder store.
pub struct ReminderScheduler {
    reminders: Arc<dyn ReminderStore>,
    users: Arc<dyn UserStore>,
    channel: Arc<dyn ReplyChannel>,
    limiter: RateLimiter,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        users: Arc<dyn UserStore>,
        channel: Arc<dyn ReplyChannel>,
        limiter: RateLimiter,
        interval: Duration,
    ) -> Self {
        Self {
            reminders,
            users,
            channel,
            limiter,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Sweep forever. Also drops idle rate-limiter windows.
    pub async fn run(self) {
        info!("Reminder scheduler started (every {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep(Utc::now()).await;
            self.limiter.cleanup();
        }
    }

    /// Deliver everything due at `now`. Returns how many were delivered.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let due = match self.reminders.due(now, SWEEP_BATCH).await {
            Ok(due) => due,
            Err(e) => {
                warn!("Failed to load due reminders: {}", e);
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }

        debug!("{} reminders due", due.len());
        let mut delivered = 0;
        for reminder in due {
            match self.reminders.mark_sent(reminder.id).await {
                Ok(true) => {}
                // Claimed by a concurrent sweep
                Ok(false) => continue,
                Err(e) => {
                    warn!("Failed to claim reminder #{}: {}", reminder.id, e);
                    continue;
                }
            }

            match self.deliver(&reminder).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to deliver reminder #{} to {}: {}", reminder.id, reminder.chat_id, e),
            }
        }
        delivered
    }

    async fn deliver(&self, reminder: &Reminder) -> anyhow::Result<()> {
        let stored_lang = match self.users.get(reminder.user_id).await {
            Ok(profile) => profile.and_then(|p| p.language),
            Err(_) => None,
        };
        let lang = i18n::resolve_locale(stored_lang.as_deref(), None);

        let text = t(lang, "reminder.fire", &[("text", &html_escape(&reminder.text))]);
        self.channel.send_text(reminder.chat_id, &text).await
    }
}
