//! /stats and /plan.

use chrono::{DateTime, FixedOffset, Utc};
use teloxide::prelude::*;
use tracing::warn;

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::events::handlers::caller;
use crate::i18n::{get_text, t};
use crate::limits::{PlanTable, Tier, UsageKind};

/// Handle /stats - today's usage against the current plan.
pub async fn stats_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };
    let gate = state.assistant.gate();
    let tier = gate.tier_of(who.user_id, Utc::now()).await;
    let limits = gate.plans().limits(tier);

    let mut used = [0u32; 3];
    for (slot, kind) in used.iter_mut().zip(UsageKind::ALL) {
        *slot = match gate.usage().get_usage(who.user_id, kind).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read {} usage for {}: {}", kind, who.user_id, e);
                return reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await;
            }
        };
    }

    let text = t(
        who.lang,
        "stats.text",
        &[
            ("tier", tier.as_str()),
            ("messages", &used[0].to_string()),
            ("messages_limit", &limits.messages.to_string()),
            ("images", &used[1].to_string()),
            ("images_limit", &limits.images.to_string()),
            ("voice", &used[2].to_string()),
            ("voice_limit", &limits.voice_minutes.to_string()),
        ],
    );
    reply_html(&bot, &msg, text).await
}

/// Handle /plan - current tier, its expiry and the limits table.
pub async fn plan_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };

    let profile = match state.users.get(who.user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Failed to load profile {}: {}", who.user_id, e);
            None
        }
    };
    let now = Utc::now();
    let tier = profile.as_ref().map(|p| p.effective_tier(now)).unwrap_or_default();
    let expiry = match tier {
        Tier::Free => None,
        _ => profile.as_ref().and_then(|p| p.plan_expiry()),
    };

    let text = t(
        who.lang,
        "plan.text",
        &[
            ("tier", tier.as_str()),
            ("expiry", &expiry_text(who.lang, expiry, state.assistant.timezone())),
            ("table", &plan_table(who.lang, state.assistant.gate().plans())),
        ],
    );
    reply_html(&bot, &msg, text).await
}

/// "forever" or "until DD.MM.YYYY" in the local offset.
pub fn expiry_text(lang: &str, expiry: Option<DateTime<Utc>>, tz: FixedOffset) -> String {
    match expiry {
        Some(at) => t(
            lang,
            "plan.until",
            &[("date", &at.with_timezone(&tz).format("%d.%m.%Y").to_string())],
        ),
        None => get_text(lang, "plan.forever"),
    }
}

/// One row per tier.
pub fn plan_table(lang: &str, plans: &PlanTable) -> String {
    Tier::ALL
        .iter()
        .map(|&tier| {
            let limits = plans.limits(tier);
            t(
                lang,
                "plan.row",
                &[
                    ("tier", tier.as_str()),
                    ("messages", &limits.messages.to_string()),
                    ("images", &limits.images.to_string()),
                    ("voice", &limits.voice_minutes.to_string()),
                ],
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_plan_table_lists_every_tier() {
        let table = plan_table("en", &PlanTable::default());
        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows, ["• FREE: 20 / 5 / 10", "• PRO: 200 / 50 / 100", "• TEAM: 1000 / 200 / 500"]);
    }

    #[test]
    fn test_expiry_text_uses_local_date() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 3, 31, 22, 30, 0).unwrap();
        assert_eq!(expiry_text("ru", Some(at), tz), "до 01.04.2025");
        assert_eq!(expiry_text("ru", None, tz), "бессрочно");
    }
}
