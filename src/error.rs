//! Error types for the assistant pipeline.
//!
//! Every error here is scoped to a single update. None of them stop the bot.

use thiserror::Error;

use crate::limits::{Tier, UsageKind};
use crate::utils::calc::CalcError;
use crate::utils::reminder_parser::ParseError;

/// Errors surfaced while handling one update.
#[derive(Debug, Error)]
pub enum BotError {
    /// Sliding-window limiter denied the call.
    #[error("rate limited")]
    RateLimited,

    /// Daily quota for this kind is used up.
    #[error("daily {kind} quota exceeded ({used}/{limit} on {tier})")]
    QuotaExceeded {
        kind: UsageKind,
        used: u32,
        limit: u32,
        tier: Tier,
    },

    #[error("reminder parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("calculator error: {0}")]
    Calc(#[from] CalcError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Fetching the user's photo or voice note from Telegram failed.
    #[error("media download failed: {0}")]
    Download(String),
}

impl BotError {
    /// Soft errors are normal outcomes shown to the user, not logged as failures.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::QuotaExceeded { .. } | Self::Parse(_) | Self::Calc(_)
        )
    }
}

/// Failures of the hosted AI API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(String),

    #[error("api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_errors() {
        assert!(BotError::RateLimited.is_soft());
        assert!(
            BotError::QuotaExceeded {
                kind: UsageKind::Message,
                used: 20,
                limit: 20,
                tier: Tier::Free,
            }
            .is_soft()
        );
        assert!(!BotError::Provider(ProviderError::Timeout).is_soft());
        assert!(!BotError::StoreUnavailable("down".into()).is_soft());
    }

    #[test]
    fn test_error_display() {
        let err = BotError::QuotaExceeded {
            kind: UsageKind::Image,
            used: 5,
            limit: 5,
            tier: Tier::Free,
        };
        assert_eq!(err.to_string(), "daily image quota exceeded (5/5 on FREE)");

        let err = ConfigError::Missing("BOT_TOKEN");
        assert_eq!(err.to_string(), "BOT_TOKEN must be set");
    }
}
