//! Message dispatcher setup.
//!
//! Builds the dispatcher with the command handlers and the assistant handlers.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::warn;

use crate::database::{HistoryStore, ReminderStore, UserIdentity, UserStore};
use crate::events::{self, Assistant};
use crate::plugins;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline (limiter, quota gate, AI provider).
    pub assistant: Assistant,

    pub users: Arc<dyn UserStore>,
    pub reminders: Arc<dyn ReminderStore>,
    pub history: Arc<dyn HistoryStore>,

    /// Owner user IDs, allowed to run /setplan, /globalstats and /broadcast.
    pub owner_ids: Vec<u64>,
}

impl AppState {
    pub fn new(
        assistant: Assistant,
        users: Arc<dyn UserStore>,
        reminders: Arc<dyn ReminderStore>,
        history: Arc<dyn HistoryStore>,
        owner_ids: Vec<u64>,
    ) -> Self {
        Self {
            assistant,
            users,
            reminders,
            history,
            owner_ids,
        }
    }

    /// Check if a user is a bot owner.
    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    bot: ThrottledBot,
    state: AppState,
) -> Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<anyhow::Error> {
    use teloxide::dispatching::UpdateFilterExt;

    // User tracking first, then commands, then the assistant
    Update::filter_message()
        .inspect_async(track_user)
        .branch(plugins::command_handler())
        .branch(events::message_event_handler())
}

/// Refresh the sender's identity in the background (runs before all handlers).
async fn track_user(msg: Message, state: AppState) {
    let Some(user) = msg.from.as_ref() else {
        return;
    };

    let identity = UserIdentity {
        user_id: user.id.0,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        language_code: user.language_code.clone(),
    };
    let users = state.users.clone();
    tokio::spawn(async move {
        if let Err(e) = users.upsert_identity(&identity).await {
            warn!("Failed to track user {}: {}", identity.user_id, e);
        }
    });
}
