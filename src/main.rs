//! Aurora - Telegram AI assistant.
//!
//! Chat, image generation and analysis, voice answers, reminders and a
//! calculator, metered by per-plan daily quotas.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Storage traits with MongoDB and in-memory backends
//! - `cache` - Moka-backed caches for the MongoDB repositories
//! - `limits` - Rate limiter, usage counter, plans and the quota gate
//! - `ai` - AI provider trait and the OpenAI client
//! - `events` - The assistant pipeline and its Telegram handlers
//! - `plugins` - Command handlers
//! - `bot` - Dispatcher, runtime and the reminder scheduler
//! - `utils` - Reminder parser, calculator, text helpers

mod ai;
mod bot;
mod cache;
mod config;
mod database;
mod error;
mod events;
mod i18n;
mod limits;
mod plugins;
mod utils;

use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai::{AiProvider, OpenAiClient};
use bot::{AppState, ReminderScheduler};
use cache::CacheRegistry;
use config::{Config, StorageBackend};
use database::{
    Database, HistoryRepository, HistoryStore, MemoryStore, ReminderRepository, ReminderStore, UserRepository,
    UserStore,
};
use error::ConfigError;
use events::Assistant;
use events::assistant::AssistantSettings;
use limits::RateLimiter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct Stores {
    users: Arc<dyn UserStore>,
    reminders: Arc<dyn ReminderStore>,
    history: Arc<dyn HistoryStore>,
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.storage {
        StorageBackend::Mongo => {
            let uri = config
                .mongodb_uri
                .as_deref()
                .ok_or(ConfigError::Missing("MONGODB_URI"))?;
            info!("Connecting to MongoDB...");
            let db = Database::connect(uri, &config.mongodb_database).await?;
            let cache = CacheRegistry::new();
            info!("Database connected");

            Ok(Stores {
                users: Arc::new(UserRepository::new(&db, &cache)),
                reminders: Arc::new(ReminderRepository::new(&db)),
                history: Arc::new(HistoryRepository::new(&db)),
            })
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage, nothing survives a restart");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                users: store.clone(),
                reminders: store.clone(),
                history: store,
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so RUST_LOG from it applies
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aurora=info,teloxide=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting Aurora bot...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Bot mode: {:?}, storage: {:?}", config.bot_mode, config.storage);

    let stores = open_stores(&config).await?;

    let ai: Arc<dyn AiProvider> = Arc::new(OpenAiClient::new(config.openai.clone())?);
    info!("AI provider ready (model {})", config.openai.chat_model);

    // Throttle keeps us inside Telegram's own flood limits
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());

    let me = bot.get_me().await?;
    let bot_username = config
        .bot_username
        .clone()
        .unwrap_or_else(|| me.username().to_string());
    info!("Using bot username: @{}", bot_username);

    if config.owner_ids.is_empty() {
        info!("No owner IDs configured (OWNER_IDS is empty)");
    } else {
        info!("Bot owners: {:?}", config.owner_ids);
    }

    let limiter = RateLimiter::new(config.rate_limit_max_calls, config.rate_limit_window);
    let assistant = Assistant::new(
        ai,
        stores.users.clone(),
        stores.reminders.clone(),
        stores.history.clone(),
        limiter.clone(),
        config.plans,
        AssistantSettings {
            max_history: config.max_history_messages,
            timezone: config.timezone,
            tts_voice: config.openai.tts_voice.clone(),
        },
    );

    let scheduler = ReminderScheduler::new(
        stores.reminders.clone(),
        stores.users.clone(),
        Arc::new(bot.clone()),
        limiter,
        config.reminder_sweep_interval,
    );
    tokio::spawn(scheduler.run());

    let state = AppState::new(
        assistant,
        stores.users.clone(),
        stores.reminders,
        stores.history,
        config.owner_ids.clone(),
    );
    let dispatcher = bot::build_dispatcher(bot.clone(), state);

    bot::run(&config, bot, dispatcher, stores.users).await
}
