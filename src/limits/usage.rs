//! Daily usage counter.
//!
//! Thin layer over [`UserStore`] that pins "today" to the UTC calendar date.
//! The store performs reset-then-act atomically per user.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use super::UsageKind;
use crate::database::{StoreResult, UserStore};

#[derive(Clone)]
pub struct UsageCounter {
    store: Arc<dyn UserStore>,
}

impl UsageCounter {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Today's count of `kind` for `user_id`.
    pub async fn get_usage(&self, user_id: u64, kind: UsageKind) -> StoreResult<u32> {
        self.get_usage_on(user_id, kind, today()).await
    }

    /// Add `amount` to today's count, returning the new value.
    pub async fn increment(&self, user_id: u64, kind: UsageKind, amount: u32) -> StoreResult<u32> {
        self.increment_on(user_id, kind, amount, today()).await
    }

    pub async fn get_usage_on(&self, user_id: u64, kind: UsageKind, day: NaiveDate) -> StoreResult<u32> {
        Ok(self.store.usage_on(user_id, day).await?.get(kind))
    }

    pub async fn increment_on(
        &self,
        user_id: u64,
        kind: UsageKind,
        amount: u32,
        day: NaiveDate,
    ) -> StoreResult<u32> {
        Ok(self.store.add_usage(user_id, kind, amount, day).await?.get(kind))
    }
}

/// Current UTC calendar date.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn counter() -> UsageCounter {
        UsageCounter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_increment_then_get_same_day() {
        let usage = counter();
        let day = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();

        assert_eq!(usage.get_usage_on(1, UsageKind::Message, day).await.unwrap(), 0);
        assert_eq!(usage.increment_on(1, UsageKind::Message, 1, day).await.unwrap(), 1);
        assert_eq!(usage.increment_on(1, UsageKind::VoiceMinute, 3, day).await.unwrap(), 3);
        assert_eq!(usage.get_usage_on(1, UsageKind::Message, day).await.unwrap(), 1);
        assert_eq!(usage.get_usage_on(1, UsageKind::Image, day).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_day_reads_zero() {
        let usage = counter();
        let monday = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        let tuesday = monday.succ_opt().unwrap();

        usage.increment_on(2, UsageKind::Image, 5, monday).await.unwrap();
        assert_eq!(usage.get_usage_on(2, UsageKind::Image, tuesday).await.unwrap(), 0);
        assert_eq!(usage.increment_on(2, UsageKind::Image, 1, tuesday).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let usage = counter();
        usage.increment(10, UsageKind::Message, 4).await.unwrap();
        assert_eq!(usage.get_usage(10, UsageKind::Message).await.unwrap(), 4);
        assert_eq!(usage.get_usage(11, UsageKind::Message).await.unwrap(), 0);
    }
}
