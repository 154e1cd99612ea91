//! Configuration module for Aurora bot.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::limits::{PlanLimits, PlanTable};

/// Bot running mode
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Storage backend for users, usage counters, history and reminders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Mongo,
    /// Process-local store, nothing survives a restart.
    Memory,
}

/// Settings for the hosted AI API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub whisper_model: String,
    pub request_timeout: Duration,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,

    /// Bot username (without @).
    /// Optional - will be fetched via getMe if not set.
    pub bot_username: Option<String>,

    /// Owner user IDs (comma-separated).
    /// Owners may change anyone's plan.
    pub owner_ids: Vec<u64>,

    // Storage
    pub storage: StorageBackend,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    // AI provider
    pub openai: OpenAiConfig,

    // Limits
    pub rate_limit_max_calls: usize,
    pub rate_limit_window: Duration,
    pub plans: PlanTable,
    pub max_history_messages: usize,

    // Reminders
    pub reminder_sweep_interval: Duration,
    /// Offset used to read wall-clock times in reminder texts.
    pub timezone: FixedOffset,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bot_mode = match var_or("BOT_MODE", "polling").to_lowercase().as_str() {
            "webhook" => BotMode::Webhook,
            _ => BotMode::Polling,
        };

        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            return Err(ConfigError::Missing("WEBHOOK_URL"));
        }

        let storage = match var_or("STORAGE", "mongo").to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "mongo" | "mongodb" => StorageBackend::Mongo,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE".to_string(),
                    value: other.to_string(),
                });
            }
        };

        let mongodb_uri = env::var("MONGODB_URI").ok().filter(|s| !s.is_empty());
        if storage == StorageBackend::Mongo && mongodb_uri.is_none() {
            return Err(ConfigError::Missing("MONGODB_URI"));
        }

        // Parse owner IDs
        let owner_ids = var_or("OWNER_IDS", "")
            .split(',')
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .collect();

        // Parse bot username (strip @ if present)
        let bot_username = env::var("BOT_USERNAME")
            .ok()
            .map(|s| s.trim_start_matches('@').to_string())
            .filter(|s| !s.is_empty());

        let openai = OpenAiConfig {
            api_key: required("OPENAI_API_KEY")?,
            base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            chat_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            vision_model: var_or("OPENAI_VISION_MODEL", "gpt-4o"),
            image_model: var_or("OPENAI_IMAGE_MODEL", "dall-e-3"),
            tts_model: var_or("OPENAI_TTS_MODEL", "tts-1"),
            tts_voice: var_or("OPENAI_TTS_VOICE", "alloy"),
            whisper_model: var_or("OPENAI_WHISPER_MODEL", "whisper-1"),
            request_timeout: Duration::from_secs(positive_var("REQUEST_TIMEOUT_SECS", 30)?),
        };

        let defaults = PlanTable::default();
        let plans = PlanTable {
            free: plan_from_env("FREE", defaults.free)?,
            pro: plan_from_env("PRO", defaults.pro)?,
            team: plan_from_env("TEAM", defaults.team)?,
        };

        let timezone = var_or("TIMEZONE_OFFSET", "+03:00");
        let timezone = parse_offset(&timezone).ok_or_else(|| ConfigError::Invalid {
            name: "TIMEZONE_OFFSET".to_string(),
            value: timezone.clone(),
        })?;

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            bot_mode,
            webhook_url,
            webhook_port: parse_var("WEBHOOK_PORT", 8443)?,
            bot_username,
            owner_ids,
            storage,
            mongodb_uri,
            mongodb_database: var_or("MONGODB_DATABASE", "aurora"),
            openai,
            rate_limit_max_calls: positive_var("RATE_LIMIT_MAX_CALLS", 30)?,
            rate_limit_window: Duration::from_secs(positive_var("RATE_LIMIT_WINDOW_SECS", 60)?),
            plans,
            max_history_messages: parse_var("MAX_HISTORY_MESSAGES", 16)?,
            reminder_sweep_interval: Duration::from_secs(positive_var("REMINDER_SWEEP_SECS", 30)?),
            timezone,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    parse_value(name, env::var(name).ok(), default)
}

/// Like [`parse_var`], but zero is rejected.
fn positive_var<T: FromStr + Default + PartialEq>(name: &str, default: T) -> Result<T, ConfigError> {
    positive_value(name, env::var(name).ok(), default)
}

fn parse_value<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
        _ => Ok(default),
    }
}

fn positive_value<T: FromStr + Default + PartialEq>(
    name: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    let value = parse_value(name, raw.clone(), default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name: name.to_string(),
            value: raw.unwrap_or_default(),
        });
    }
    Ok(value)
}

/// Read `{TIER}_DAILY_MESSAGES|IMAGES|VOICE`, falling back to `defaults`.
fn plan_from_env(tier: &str, defaults: PlanLimits) -> Result<PlanLimits, ConfigError> {
    Ok(PlanLimits {
        messages: parse_var(&format!("{tier}_DAILY_MESSAGES"), defaults.messages)?,
        images: parse_var(&format!("{tier}_DAILY_IMAGES"), defaults.images)?,
        voice_minutes: parse_var(&format!("{tier}_DAILY_VOICE"), defaults.voice_minutes)?,
    })
}

/// Parse a UTC offset such as `+03:00`, `-0530` or `+3`.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.chars().next()? {
        '+' => (1, &raw[1..]),
        '-' => (-1, &raw[1..]),
        _ => (1, raw),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
        None => (rest, "0"),
    };

    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60) as i32)
}
