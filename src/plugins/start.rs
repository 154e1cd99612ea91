//! /start and /help.

use teloxide::prelude::*;

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::events::handlers::caller;
use crate::i18n::{get_text, t};
use crate::utils::html_escape;

/// Handle the /start command.
pub async fn start_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };
    let name = msg
        .from
        .as_ref()
        .map(|u| html_escape(&u.first_name))
        .unwrap_or_default();

    reply_html(&bot, &msg, t(who.lang, "start.welcome", &[("name", &name)])).await
}

/// Handle the /help command.
pub async fn help_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };
    reply_html(&bot, &msg, get_text(who.lang, "help.text")).await
}
