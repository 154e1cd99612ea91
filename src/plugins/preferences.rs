//! Per-user preferences: /persona, /language, /reset.

use teloxide::prelude::*;
use tracing::{info, warn};

use super::reply_html;
use crate::ai::Persona;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::events::handlers::caller;
use crate::i18n::{self, get_text, t};

fn persona_list() -> String {
    Persona::ALL.map(|p| p.key()).join(", ")
}

/// Handle /persona [name].
pub async fn persona_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };

    let args = args.trim();
    if args.is_empty() {
        let text = t(
            who.lang,
            "persona.current",
            &[("persona", who.persona.key()), ("list", &persona_list())],
        );
        return reply_html(&bot, &msg, text).await;
    }

    let Some(persona) = Persona::parse(args) else {
        return reply_html(&bot, &msg, t(who.lang, "persona.unknown", &[("list", &persona_list())])).await;
    };

    if let Err(e) = state.users.set_persona(who.user_id, persona.key()).await {
        warn!("Failed to set persona for {}: {}", who.user_id, e);
        return reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await;
    }
    info!("User {} switched persona to {}", who.user_id, persona);
    reply_html(&bot, &msg, t(who.lang, "persona.set", &[("persona", persona.key())])).await
}

/// Handle /language [ru|en].
pub async fn language_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };

    let args = args.trim();
    if args.is_empty() {
        return reply_html(&bot, &msg, t(who.lang, "language.current", &[("lang", who.lang)])).await;
    }

    let Some(lang) = i18n::normalize(args) else {
        return reply_html(&bot, &msg, get_text(who.lang, "language.unknown")).await;
    };

    if let Err(e) = state.users.set_language(who.user_id, lang).await {
        warn!("Failed to set language for {}: {}", who.user_id, e);
        return reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await;
    }
    reply_html(&bot, &msg, get_text(lang, "language.set")).await
}

/// Handle /reset - forget the dialog history.
pub async fn reset_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };

    match state.history.clear(who.user_id).await {
        Ok(count) => {
            reply_html(&bot, &msg, t(who.lang, "reset.done", &[("count", &count.to_string())])).await
        }
        Err(e) => {
            warn!("Failed to clear history for {}: {}", who.user_id, e);
            reply_html(&bot, &msg, get_text(who.lang, "errors.store")).await
        }
    }
}
