//! Owner commands.
//!
//! - `/setplan <user_id> <FREE|PRO|TEAM> [days]` changes a user's tier. Without
//!   `days` a paid tier never expires.
//! - `/globalstats` shows platform-wide totals for today.
//! - `/broadcast <text>` sends a message to every known user in the background
//!   and reports back when done.

use chrono::{DateTime, Duration, Utc};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

use super::account::expiry_text;
use super::reply_html;
use crate::bot::broadcast::broadcast;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::PlatformStats;
use crate::events::Caller;
use crate::events::handlers::caller;
use crate::i18n::{get_text, t};
use crate::limits::Tier;
use crate::utils::html_escape;

/// Longest plan an owner can grant in one go.
const MAX_PLAN_DAYS: i64 = 3650;

/// Parsed `/setplan` arguments.
#[derive(Debug, PartialEq, Eq)]
pub struct PlanGrant {
    pub user_id: u64,
    pub tier: Tier,
    pub days: Option<i64>,
}

impl PlanGrant {
    pub fn parse(args: &str) -> Option<Self> {
        let mut parts = args.split_whitespace();
        let user_id = parts.next()?.parse().ok()?;
        let tier = Tier::parse(parts.next()?)?;
        let days = match parts.next() {
            Some(raw) => Some(raw.parse::<i64>().ok().filter(|d| (1..=MAX_PLAN_DAYS).contains(d))?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { user_id, tier, days })
    }

    /// FREE never expires, paid tiers expire after `days` when given.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.tier {
            Tier::Free => None,
            _ => self.days.map(|d| now + Duration::days(d)),
        }
    }
}

/// Handle /setplan (owners only).
pub async fn setplan_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(who) = owner(&bot, &msg, &state).await? else {
        return Ok(());
    };

    let Some(grant) = PlanGrant::parse(&args) else {
        return reply_html(&bot, &msg, get_text(who.lang, "setplan.usage")).await;
    };

    let expires_at = grant.expires_at(Utc::now());
    if let Err(e) = state.users.set_plan(grant.user_id, grant.tier, expires_at).await {
        warn!("Failed to set plan for {}: {}", grant.user_id, e);
        return reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await;
    }
    info!("Owner {} set {} to {} (expires {:?})", who.user_id, grant.user_id, grant.tier, expires_at);

    let text = t(
        who.lang,
        "setplan.done",
        &[
            ("user", &grant.user_id.to_string()),
            ("tier", grant.tier.as_str()),
            ("expiry", &expiry_text(who.lang, expires_at, state.assistant.timezone())),
        ],
    );
    reply_html(&bot, &msg, text).await
}

/// Render platform totals.
pub fn stats_text(lang: &str, stats: &PlatformStats, pending_reminders: u64) -> String {
    t(
        lang,
        "admin.stats",
        &[
            ("users", &stats.users.to_string()),
            ("active", &stats.active_today.to_string()),
            ("free", &stats.free.to_string()),
            ("pro", &stats.pro.to_string()),
            ("team", &stats.team.to_string()),
            ("messages", &stats.usage.messages.to_string()),
            ("images", &stats.usage.images.to_string()),
            ("voice", &stats.usage.voice_minutes.to_string()),
            ("reminders", &pending_reminders.to_string()),
        ],
    )
}

/// Handle /globalstats (owners only).
pub async fn globalstats_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = owner(&bot, &msg, &state).await? else {
        return Ok(());
    };

    let stats = state.users.stats(Utc::now()).await;
    let pending = state.reminders.count_pending().await;
    let (stats, pending) = match (stats, pending) {
        (Ok(stats), Ok(pending)) => (stats, pending),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to collect platform stats: {}", e);
            return reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await;
        }
    };

    reply_html(&bot, &msg, stats_text(who.lang, &stats, pending)).await
}

/// Handle /broadcast (owners only).
pub async fn broadcast_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(who) = owner(&bot, &msg, &state).await? else {
        return Ok(());
    };

    let text = args.trim();
    if text.is_empty() {
        return reply_html(&bot, &msg, get_text(who.lang, "admin.broadcast_usage")).await;
    }

    // Private chats share the user's id
    let chat_ids: Vec<i64> = match state.users.user_ids().await {
        Ok(ids) => ids.into_iter().filter_map(|id| i64::try_from(id).ok()).collect(),
        Err(e) => {
            warn!("Failed to list users for broadcast: {}", e);
            return reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await;
        }
    };

    info!("Owner {} started a broadcast to {} users", who.user_id, chat_ids.len());
    let started = t(who.lang, "admin.broadcast_started", &[("count", &chat_ids.len().to_string())]);
    reply_html(&bot, &msg, started).await?;

    let body = format!("📢 {}", html_escape(text));
    let chat_id = msg.chat.id;
    tokio::spawn(async move {
        let report = broadcast(&bot, &chat_ids, &body).await;
        let done = t(
            who.lang,
            "admin.broadcast_done",
            &[
                ("delivered", &report.delivered.to_string()),
                ("failed", &report.failed.to_string()),
            ],
        );
        if let Err(e) = bot.send_message(chat_id, done).parse_mode(ParseMode::Html).await {
            warn!("Failed to report broadcast to {}: {}", chat_id, e);
        }
    });
    Ok(())
}

/// Resolve the sender and answer non-owners with a refusal.
async fn owner(bot: &ThrottledBot, msg: &Message, state: &AppState) -> anyhow::Result<Option<Caller>> {
    let Some(who) = caller(msg, state).await else {
        return Ok(None);
    };
    if !state.is_owner(who.user_id) {
        reply_html(bot, msg, get_text(who.lang, "admin.denied")).await?;
        return Ok(None);
    }
    Ok(Some(who))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grant() {
        assert_eq!(
            PlanGrant::parse("123 pro 30"),
            Some(PlanGrant {
                user_id: 123,
                tier: Tier::Pro,
                days: Some(30),
            })
        );
        assert_eq!(
            PlanGrant::parse(" 5  TEAM "),
            Some(PlanGrant {
                user_id: 5,
                tier: Tier::Team,
                days: None,
            })
        );
        assert_eq!(PlanGrant::parse(""), None);
        assert_eq!(PlanGrant::parse("abc pro"), None);
        assert_eq!(PlanGrant::parse("1 vip"), None);
        assert_eq!(PlanGrant::parse("1 pro 0"), None);
        assert_eq!(PlanGrant::parse("1 pro 30 extra"), None);
    }

    #[test]
    fn test_stats_text_lists_totals() {
        let stats = PlatformStats {
            users: 12,
            active_today: 4,
            free: 9,
            pro: 2,
            team: 1,
            usage: crate::database::UsageCounters {
                date: None,
                messages: 57,
                images: 6,
                voice_minutes: 11,
            },
        };

        let text = stats_text("en", &stats, 3);
        assert!(text.contains("Users: 12 (active today: 4)"), "{text}");
        assert!(text.contains("PRO: 2"));
        assert!(text.contains("Messages: 57"));
        assert!(text.contains("Voice (min): 11"));
        assert!(text.contains("Pending reminders: 3"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_free_never_expires() {
        let now = Utc::now();
        let free = PlanGrant::parse("1 free 30").unwrap();
        assert_eq!(free.expires_at(now), None);

        let pro = PlanGrant::parse("1 pro 30").unwrap();
        assert_eq!(pro.expires_at(now), Some(now + Duration::days(30)));
    }
}
