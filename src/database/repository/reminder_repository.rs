//! Reminder repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Collection;
use tracing::debug;

use crate::database::models::{NewReminder, Reminder};
use crate::database::store::{ReminderStore, StoreError, StoreResult};
use crate::database::Database;

/// Repository for scheduled reminders.
///
/// IDs come from a `$inc` counter document so they stay short and
/// monotonically increasing.
#[derive(Clone)]
pub struct ReminderRepository {
    collection: Collection<Reminder>,
    counters: Collection<Document>,
}

impl ReminderRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("reminders"),
            counters: db.collection("counters"),
        }
    }

    async fn next_id(&self) -> StoreResult<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": "reminders" }, doc! { "$inc": { "seq": 1_i64 } })
            .with_options(options)
            .await?
            .ok_or(StoreError::Missing("reminder sequence"))?;

        counter
            .get_i64("seq")
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl ReminderStore for ReminderRepository {
    async fn insert(&self, reminder: NewReminder) -> StoreResult<Reminder> {
        let stored = Reminder {
            id: self.next_id().await?,
            user_id: reminder.user_id,
            chat_id: reminder.chat_id,
            text: reminder.text,
            fire_at: reminder.fire_at.timestamp(),
            sent: false,
            created_at: Utc::now().timestamp(),
        };
        self.collection.insert_one(&stored).await?;
        debug!("Stored reminder #{} for user {}", stored.id, stored.user_id);
        Ok(stored)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Reminder>> {
        let filter = doc! { "sent": false, "fire_at": { "$lte": now.timestamp() } };
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "fire_at": 1, "id": 1 })
            .limit(limit as i64)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn mark_sent(&self, id: i64) -> StoreResult<bool> {
        let result = self
            .collection
            .update_one(doc! { "id": id, "sent": false }, doc! { "$set": { "sent": true } })
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn pending_for(&self, user_id: u64) -> StoreResult<Vec<Reminder>> {
        let cursor = self
            .collection
            .find(doc! { "user_id": user_id as i64, "sent": false })
            .sort(doc! { "fire_at": 1, "id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_pending(&self) -> StoreResult<u64> {
        Ok(self.collection.count_documents(doc! { "sent": false }).await?)
    }
}
