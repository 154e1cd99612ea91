//! Quota gate.
//!
//! Every quota-consuming action goes through [`QuotaGate::run`]:
//! check the counter against the tier ceiling, run the action, and commit
//! the usage only when the action succeeded.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::usage::UsageCounter;
use super::{PlanTable, Tier, UsageKind};
use crate::database::UserStore;
use crate::error::BotError;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub tier: Tier,
    pub used: u32,
    pub limit: u32,
    pub allowed: bool,
}

impl QuotaCheck {
    fn denied(self, kind: UsageKind) -> BotError {
        BotError::QuotaExceeded {
            kind,
            used: self.used,
            limit: self.limit,
            tier: self.tier,
        }
    }
}

#[derive(Clone)]
pub struct QuotaGate {
    users: Arc<dyn UserStore>,
    usage: UsageCounter,
    plans: PlanTable,
}

impl QuotaGate {
    pub fn new(users: Arc<dyn UserStore>, plans: PlanTable) -> Self {
        Self {
            usage: UsageCounter::new(users.clone()),
            users,
            plans,
        }
    }

    pub fn plans(&self) -> &PlanTable {
        &self.plans
    }

    pub fn usage(&self) -> &UsageCounter {
        &self.usage
    }

    /// Tier in force for `user_id` now. Unknown users and store errors read as FREE.
    pub async fn tier_of(&self, user_id: u64, now: DateTime<Utc>) -> Tier {
        match self.users.get(user_id).await {
            Ok(Some(profile)) => profile.effective_tier(now),
            Ok(None) => Tier::Free,
            Err(e) => {
                warn!("Failed to load profile {} for tier lookup: {}", user_id, e);
                Tier::Free
            }
        }
    }

    /// Compare today's usage against the ceiling.
    ///
    /// If the counter cannot be read the check allows the action.
    pub async fn check(&self, user_id: u64, kind: UsageKind) -> QuotaCheck {
        let tier = self.tier_of(user_id, Utc::now()).await;
        let limit = self.plans.limit_for(tier, kind);

        match self.usage.get_usage(user_id, kind).await {
            Ok(used) => QuotaCheck {
                tier,
                used,
                limit,
                allowed: used < limit,
            },
            Err(e) => {
                warn!("Usage store unavailable for {}, allowing {}: {}", user_id, kind, e);
                QuotaCheck {
                    tier,
                    used: 0,
                    limit,
                    allowed: true,
                }
            }
        }
    }

    pub async fn may_proceed(&self, user_id: u64, kind: UsageKind) -> bool {
        self.check(user_id, kind).await.allowed
    }

    /// Check, run `action`, then commit `amount` units of `kind`.
    ///
    /// The action is not started when the quota is exhausted, and nothing
    /// is committed when it fails.
    pub async fn run<T, E, F, Fut>(
        &self,
        user_id: u64,
        kind: UsageKind,
        amount: u32,
        action: F,
    ) -> Result<T, BotError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BotError>,
    {
        let check = self.check(user_id, kind).await;
        if !check.allowed {
            debug!(
                "User {} hit {} quota ({}/{} on {})",
                user_id, kind, check.used, check.limit, check.tier
            );
            return Err(check.denied(kind));
        }

        let value = action().await.map_err(Into::into)?;

        if let Err(e) = self.usage.increment(user_id, kind, amount).await {
            warn!("Failed to commit {} {} for {}: {}", amount, kind, user_id, e);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::database::{
        MemoryStore, PlatformStats, StoreError, StoreResult, UsageCounters, UserIdentity, UserProfile,
    };
    use crate::error::ProviderError;

    fn gate_with(store: Arc<MemoryStore>) -> QuotaGate {
        QuotaGate::new(store, PlanTable::default())
    }

    #[tokio::test]
    async fn test_boundary_at_limit() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone());

        gate.usage().increment(1, UsageKind::Image, 4).await.unwrap();
        assert!(gate.may_proceed(1, UsageKind::Image).await);

        gate.usage().increment(1, UsageKind::Image, 1).await.unwrap();
        assert!(!gate.may_proceed(1, UsageKind::Image).await);
    }

    #[tokio::test]
    async fn test_paid_tier_and_expiry() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone());
        gate.usage().increment(2, UsageKind::Message, 20).await.unwrap();
        assert!(!gate.may_proceed(2, UsageKind::Message).await);

        store
            .set_plan(2, Tier::Pro, Some(Utc::now() + Duration::days(30)))
            .await
            .unwrap();
        let check = gate.check(2, UsageKind::Message).await;
        assert_eq!(check.tier, Tier::Pro);
        assert_eq!(check.limit, 200);
        assert!(check.allowed);

        store
            .set_plan(2, Tier::Pro, Some(Utc::now() - Duration::minutes(1)))
            .await
            .unwrap();
        assert!(!gate.may_proceed(2, UsageKind::Message).await);
    }

    #[tokio::test]
    async fn test_run_commits_only_on_success() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store);

        let failed: Result<(), BotError> = gate
            .run(3, UsageKind::Message, 1, || async {
                Err::<(), _>(ProviderError::Timeout)
            })
            .await;
        assert!(matches!(failed, Err(BotError::Provider(ProviderError::Timeout))));
        assert_eq!(gate.usage().get_usage(3, UsageKind::Message).await.unwrap(), 0);

        let reply = gate
            .run(3, UsageKind::VoiceMinute, 2, || async { Ok::<_, BotError>("ok") })
            .await
            .unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(gate.usage().get_usage(3, UsageKind::VoiceMinute).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_denied_skips_action() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store);
        gate.usage().increment(4, UsageKind::Image, 5).await.unwrap();

        let calls = AtomicUsize::new(0);
        let result = gate
            .run(4, UsageKind::Image, 1, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BotError>(())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match result {
            Err(BotError::QuotaExceeded { used, limit, tier, .. }) => {
                assert_eq!((used, limit, tier), (5, 5, Tier::Free));
            }
            other => panic!("expected quota error, got {other:?}"),
        }
    }

    struct DownStore;

    #[async_trait]
    impl UserStore for DownStore {
        async fn upsert_identity(&self, _: &UserIdentity) -> StoreResult<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn get(&self, _: u64) -> StoreResult<Option<UserProfile>> {
            Err(StoreError::Database("down".into()))
        }
        async fn set_plan(&self, _: u64, _: Tier, _: Option<DateTime<Utc>>) -> StoreResult<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn set_persona(&self, _: u64, _: &str) -> StoreResult<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn set_language(&self, _: u64, _: &str) -> StoreResult<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn usage_on(&self, _: u64, _: NaiveDate) -> StoreResult<UsageCounters> {
            Err(StoreError::Database("down".into()))
        }
        async fn add_usage(&self, _: u64, _: UsageKind, _: u32, _: NaiveDate) -> StoreResult<UsageCounters> {
            Err(StoreError::Database("down".into()))
        }
        async fn stats(&self, _: DateTime<Utc>) -> StoreResult<PlatformStats> {
            Err(StoreError::Database("down".into()))
        }
        async fn user_ids(&self) -> StoreResult<Vec<u64>> {
            Err(StoreError::Database("down".into()))
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Database("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let gate = QuotaGate::new(Arc::new(DownStore), PlanTable::default());
        assert!(gate.may_proceed(9, UsageKind::Message).await);

        let value = gate
            .run(9, UsageKind::Message, 1, || async { Ok::<_, BotError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
