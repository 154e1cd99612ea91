//! Plugin system for command handlers.
//!
//! Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_plugin;` below
//! 3. Adding the handler to `command_handler()`

pub mod account;
pub mod admin;
pub mod preferences;
pub mod reminders;
pub mod start;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters};
use teloxide::utils::command::BotCommands;

use crate::bot::dispatcher::ThrottledBot;

/// All bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "Начало работы")]
    Start(String),

    #[command(description = "Справка")]
    Help,

    #[command(description = "Расход лимитов за сегодня")]
    Stats,

    #[command(description = "Ваш тариф")]
    Plan,

    #[command(description = "Стиль ответов")]
    Persona(String),

    #[command(description = "Язык интерфейса")]
    Language(String),

    #[command(description = "Очистить историю диалога")]
    Reset,

    #[command(description = "Активные напоминания")]
    Reminders,

    #[command(description = "Назначить тариф (владельцы)")]
    Setplan(String),

    #[command(description = "Статистика платформы (владельцы)")]
    Globalstats,

    #[command(description = "Рассылка всем пользователям (владельцы)")]
    Broadcast(String),
}

/// Build the combined command handler.
pub fn command_handler() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start(args)].endpoint(start::start_command))
        .branch(case![Command::Help].endpoint(start::help_command))
        .branch(case![Command::Stats].endpoint(account::stats_command))
        .branch(case![Command::Plan].endpoint(account::plan_command))
        .branch(case![Command::Persona(args)].endpoint(preferences::persona_command))
        .branch(case![Command::Language(args)].endpoint(preferences::language_command))
        .branch(case![Command::Reset].endpoint(preferences::reset_command))
        .branch(case![Command::Reminders].endpoint(reminders::reminders_command))
        .branch(case![Command::Setplan(args)].endpoint(admin::setplan_command))
        .branch(case![Command::Globalstats].endpoint(admin::globalstats_command))
        .branch(case![Command::Broadcast(args)].endpoint(admin::broadcast_command))
}

/// Reply to `msg` with an HTML message.
pub(crate) async fn reply_html(bot: &ThrottledBot, msg: &Message, text: String) -> anyhow::Result<()> {
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}
