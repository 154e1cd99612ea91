//! /reminders - list pending reminders.

use chrono::FixedOffset;
use teloxide::prelude::*;
use tracing::warn;

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::Reminder;
use crate::events::handlers::caller;
use crate::i18n::{get_text, t};
use crate::utils::html_escape;

pub async fn reminders_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };

    let text = match state.reminders.pending_for(who.user_id).await {
        Ok(pending) => format_pending(who.lang, &pending, state.assistant.timezone()),
        Err(e) => {
            warn!("Failed to list reminders for {}: {}", who.user_id, e);
            get_text(who.lang, "errors.store")
        }
    };
    reply_html(&bot, &msg, text).await
}

fn format_pending(lang: &str, pending: &[Reminder], tz: FixedOffset) -> String {
    if pending.is_empty() {
        return get_text(lang, "reminder.list_empty");
    }

    let time_format = get_text(lang, "reminder.time_format");
    let mut text = get_text(lang, "reminder.list_header");
    for reminder in pending {
        let time = reminder.fire_time().with_timezone(&tz).format(&time_format).to_string();
        text.push('\n');
        text.push_str(&t(
            lang,
            "reminder.list_item",
            &[
                ("id", &reminder.id.to_string()),
                ("time", &time),
                ("text", &html_escape(&reminder.text)),
            ],
        ));
    }
    text
}
