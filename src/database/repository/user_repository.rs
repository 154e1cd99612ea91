//! User repository.
//!
//! Profiles are cached in the `"profiles"` cache. Daily counters always go
//! to MongoDB: both reads and increments run as a single
//! `findOneAndUpdate` whose pipeline first resets stale counters, so a day
//! rollover and the first action of the new day cannot race.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions};
use mongodb::Collection;
use tracing::debug;

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::models::{PlatformStats, UsageCounters, UserProfile};
use crate::database::store::{StoreError, StoreResult, UserIdentity, UserStore};
use crate::database::Database;
use crate::limits::{Tier, UsageKind};

/// Repository for user profiles and their daily counters.
#[derive(Clone)]
pub struct UserRepository {
    db: Database,
    collection: Collection<UserProfile>,
    cache: TypedCache<u64, UserProfile>,
}

impl UserRepository {
    pub fn new(db: &Database, cache: &CacheRegistry) -> Self {
        Self {
            db: db.clone(),
            collection: db.collection("users"),
            cache: cache.get_or_create("profiles", CacheConfig::profiles()),
        }
    }

    async fn set_fields(&self, user_id: u64, fields: Document) -> StoreResult<()> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.collection
            .update_one(doc! { "user_id": user_id as i64 }, doc! { "$set": fields })
            .with_options(options)
            .await?;
        self.cache.invalidate(&user_id);
        Ok(())
    }

    /// Run the counter pipeline and return the resulting counters.
    async fn apply_usage(&self, user_id: u64, pipeline: Vec<Document>) -> StoreResult<UsageCounters> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let profile = self
            .collection
            .find_one_and_update(doc! { "user_id": user_id as i64 }, pipeline)
            .with_options(options)
            .await?
            .ok_or(StoreError::Missing("usage counters"))?;

        if self.cache.get(&user_id).is_some() {
            self.cache.insert(user_id, profile.clone());
        }
        Ok(profile.usage)
    }
}

/// Pipeline stage replacing `usage` with zeroed counters unless it is dated `today`.
fn rollover_stage(today: NaiveDate, now: i64) -> Document {
    let today = today.format("%Y-%m-%d").to_string();
    doc! {
        "$set": {
            "usage": {
                "$cond": {
                    "if": { "$eq": ["$usage.date", today.as_str()] },
                    "then": "$usage",
                    "else": {
                        "date": today.as_str(),
                        "messages": 0_i64,
                        "images": 0_i64,
                        "voice_minutes": 0_i64,
                    },
                }
            },
            "created_at": { "$ifNull": ["$created_at", now] },
        }
    }
}

/// Pipeline stage adding `amount` to one counter.
fn increment_stage(kind: UsageKind, amount: u32, now: i64) -> Document {
    let field = kind.field();
    let mut set = Document::new();
    set.insert(
        format!("usage.{field}"),
        doc! { "$add": [format!("$usage.{field}"), amount as i64] },
    );
    set.insert("updated_at", now);
    doc! { "$set": set }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn upsert_identity(&self, identity: &UserIdentity) -> StoreResult<()> {
        let user_id = identity.user_id;

        if let Some(cached) = self.cache.get(&user_id)
            && cached.username == identity.username
            && cached.first_name == identity.first_name
        {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        let language = identity.language_code.clone().map(Bson::String).unwrap_or(Bson::Null);
        let update = doc! {
            "$set": {
                "username": identity.username.clone(),
                "first_name": identity.first_name.as_str(),
                "updated_at": now,
            },
            "$setOnInsert": {
                "language": language,
                "persona": "default",
                "plan": Tier::Free.as_str(),
                "created_at": now,
            },
        };
        let options = UpdateOptions::builder().upsert(true).build();
        self.collection
            .update_one(doc! { "user_id": user_id as i64 }, update)
            .with_options(options)
            .await?;

        self.cache.invalidate(&user_id);
        debug!("Upserted user {} (@{:?})", user_id, identity.username);
        Ok(())
    }

    async fn get(&self, user_id: u64) -> StoreResult<Option<UserProfile>> {
        if let Some(user) = self.cache.get(&user_id) {
            return Ok(Some(user));
        }

        let result = self.collection.find_one(doc! { "user_id": user_id as i64 }).await?;
        if let Some(user) = &result {
            self.cache.insert(user_id, user.clone());
        }
        Ok(result)
    }

    async fn set_plan(&self, user_id: u64, tier: Tier, expires_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        self.set_fields(
            user_id,
            doc! {
                "plan": tier.as_str(),
                "plan_expires_at": expires_at.map(|t| t.timestamp()),
                "updated_at": Utc::now().timestamp(),
            },
        )
        .await?;
        debug!("Set plan {} for user {} until {:?}", tier, user_id, expires_at);
        Ok(())
    }

    async fn set_persona(&self, user_id: u64, persona: &str) -> StoreResult<()> {
        self.set_fields(user_id, doc! { "persona": persona }).await
    }

    async fn set_language(&self, user_id: u64, language: &str) -> StoreResult<()> {
        self.set_fields(user_id, doc! { "language": language }).await
    }

    async fn usage_on(&self, user_id: u64, today: NaiveDate) -> StoreResult<UsageCounters> {
        let now = Utc::now().timestamp();
        self.apply_usage(user_id, vec![rollover_stage(today, now)]).await
    }

    async fn add_usage(
        &self,
        user_id: u64,
        kind: UsageKind,
        amount: u32,
        today: NaiveDate,
    ) -> StoreResult<UsageCounters> {
        let now = Utc::now().timestamp();
        let pipeline = vec![rollover_stage(today, now), increment_stage(kind, amount, now)];
        let usage = self.apply_usage(user_id, pipeline).await?;
        debug!("User {} {} usage now {}", user_id, kind, usage.get(kind));
        Ok(usage)
    }

    async fn stats(&self, now: DateTime<Utc>) -> StoreResult<PlatformStats> {
        let mut cursor = self
            .collection
            .find(doc! {})
            .projection(doc! { "user_id": 1, "plan": 1, "plan_expires_at": 1, "usage": 1 })
            .await?;

        let mut stats = PlatformStats::default();
        while let Some(profile) = cursor.try_next().await? {
            stats.count(&profile, now);
        }
        Ok(stats)
    }

    async fn user_ids(&self) -> StoreResult<Vec<u64>> {
        let ids = self.collection.distinct("user_id", doc! {}).await?;
        Ok(ids
            .iter()
            .filter_map(|id| id.as_i64().or_else(|| id.as_i32().map(i64::from)))
            .filter_map(|id| u64::try_from(id).ok())
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(self.db.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_stage_targets_counter() {
        let stage = increment_stage(UsageKind::VoiceMinute, 3, 100);
        let set = stage.get_document("$set").unwrap();
        let add = set.get_document("usage.voice_minutes").unwrap();
        let args = add.get_array("$add").unwrap();
        assert_eq!(args[0], Bson::String("$usage.voice_minutes".into()));
        assert_eq!(args[1], Bson::Int64(3));
        assert_eq!(set.get_i64("updated_at").unwrap(), 100);
    }

    #[test]
    fn test_rollover_stage_compares_iso_date() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let stage = rollover_stage(today, 0);
        let cond = stage
            .get_document("$set")
            .and_then(|s| s.get_document("usage"))
            .and_then(|u| u.get_document("$cond"))
            .unwrap();
        let eq = cond.get_document("if").unwrap().get_array("$eq").unwrap();
        assert_eq!(eq[1], Bson::String("2025-06-01".into()));
        let reset = cond.get_document("else").unwrap();
        assert_eq!(reset.get_i64("messages").unwrap(), 0);
    }
}
