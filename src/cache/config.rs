//! Cache configuration.

use std::time::Duration;

/// Size and expiry settings for one cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_capacity: u64,

    /// Entries are evicted this long after insertion.
    pub ttl: Option<Duration>,

    /// Entries are evicted if not read within this duration.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)),
            tti: None,
        }
    }
}

impl CacheConfig {
    /// Set time-to-live for entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Set time-to-idle for entries.
    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// User profiles, read on every update. Counters are never served from here.
    pub fn profiles() -> Self {
        Self {
            max_capacity: 20_000,
            ttl: Some(Duration::from_secs(300)),
            tti: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = CacheConfig::default()
            .ttl(Duration::from_secs(5))
            .tti(Duration::from_secs(1));
        assert_eq!(config.ttl, Some(Duration::from_secs(5)));
        assert_eq!(config.tti, Some(Duration::from_secs(1)));
        assert_eq!(config.max_capacity, 10_000);
    }
}
