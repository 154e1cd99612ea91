//! Telegram side of the assistant: downloads media, sends replies.

use teloxide::dispatching::UpdateHandler;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, ParseMode};
use tracing::{debug, warn};
use url::Url;

use super::{Caller, Reply};
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::error::BotError;
use crate::utils::{MAX_MESSAGE_CHARS, split_html};

/// Build the handler for plain text, photos and voice notes.
///
/// Commands never reach this branch; anything starting with `/` that the
/// command parser did not accept is ignored.
pub fn message_event_handler() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(voice_handler))
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(photo_handler))
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some_and(|t| !t.starts_with('/')))
                .endpoint(text_handler),
        )
}

/// Resolve the sender of `msg`, if any.
pub async fn caller(msg: &Message, state: &AppState) -> Option<Caller> {
    let user = msg.from.as_ref()?;
    Some(
        state
            .assistant
            .caller(user.id.0, msg.chat.id.0, user.language_code.as_deref())
            .await,
    )
}

async fn text_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let (Some(who), Some(text)) = (caller(&msg, &state).await, msg.text()) else {
        return Ok(());
    };

    debug!("Text from {}: {}", who.user_id, text.chars().take(30).collect::<String>());
    typing(&bot, &msg, ChatAction::Typing).await;

    let reply = state.assistant.handle_text(&who, text).await;
    send_reply(&bot, msg.chat.id, reply).await
}

async fn photo_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };
    // Telegram lists sizes smallest first
    let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
        return Ok(());
    };

    typing(&bot, &msg, ChatAction::Typing).await;
    let file_id = photo.file.id.clone();
    let reply = state
        .assistant
        .handle_photo(&who, msg.caption(), || download(&bot, file_id))
        .await;
    send_reply(&bot, msg.chat.id, reply).await
}

async fn voice_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(who) = caller(&msg, &state).await else {
        return Ok(());
    };
    let Some(voice) = msg.voice() else {
        return Ok(());
    };

    typing(&bot, &msg, ChatAction::RecordVoice).await;
    let file_id = voice.file.id.clone();
    let reply = state
        .assistant
        .handle_voice(&who, voice.duration.seconds(), || download(&bot, file_id))
        .await;
    send_reply(&bot, msg.chat.id, reply).await
}

async fn download(bot: &ThrottledBot, file_id: String) -> Result<Vec<u8>, BotError> {
    let file = bot
        .get_file(file_id)
        .await
        .map_err(|e| BotError::Download(e.to_string()))?;
    let mut buf = Vec::new();
    bot.inner()
        .download_file(&file.path, &mut buf)
        .await
        .map_err(|e| BotError::Download(e.to_string()))?;
    Ok(buf)
}

async fn typing(bot: &ThrottledBot, msg: &Message, action: ChatAction) {
    if let Err(e) = bot.send_chat_action(msg.chat.id, action).await {
        debug!("Chat action failed in {}: {}", msg.chat.id, e);
    }
}

/// Deliver a [`Reply`], splitting long text into several messages.
pub async fn send_reply(bot: &ThrottledBot, chat_id: ChatId, reply: Reply) -> anyhow::Result<()> {
    match reply {
        Reply::Text(text) => send_html(bot, chat_id, &text).await,
        Reply::Photo { url, caption } => {
            let Ok(parsed) = Url::parse(&url) else {
                warn!("Provider returned an invalid image url: {}", url);
                return send_html(bot, chat_id, &caption).await;
            };
            bot.send_photo(chat_id, InputFile::url(parsed))
                .caption(caption)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        }
        Reply::Voice { audio, text } => {
            bot.send_voice(chat_id, InputFile::memory(audio).file_name("answer.mp3"))
                .await?;
            send_html(bot, chat_id, &text).await
        }
    }
}

async fn send_html(bot: &ThrottledBot, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
    for chunk in split_html(text, MAX_MESSAGE_CHARS) {
        bot.send_message(chat_id, chunk).parse_mode(ParseMode::Html).await?;
    }
    Ok(())
}
