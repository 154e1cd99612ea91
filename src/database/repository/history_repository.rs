//! Dialog history repository.

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Collection;

use crate::database::models::{HistoryMessage, MessageKind, Role};
use crate::database::store::{HistoryStore, StoreResult};
use crate::database::Database;

#[derive(Clone)]
pub struct HistoryRepository {
    collection: Collection<HistoryMessage>,
}

impl HistoryRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("history"),
        }
    }
}

#[async_trait]
impl HistoryStore for HistoryRepository {
    async fn push(&self, user_id: u64, role: Role, content: &str, kind: MessageKind) -> StoreResult<()> {
        let message = HistoryMessage {
            user_id,
            role,
            content: content.to_string(),
            kind,
            created_at: Utc::now().timestamp_millis(),
        };
        self.collection.insert_one(&message).await?;
        Ok(())
    }

    async fn recent(&self, user_id: u64, limit: usize) -> StoreResult<Vec<HistoryMessage>> {
        let cursor = self
            .collection
            .find(doc! { "user_id": user_id as i64 })
            .sort(doc! { "created_at": -1 })
            .limit(limit as i64)
            .await?;
        let mut messages: Vec<HistoryMessage> = cursor.try_collect().await?;
        messages.reverse();
        Ok(messages)
    }

    async fn clear(&self, user_id: u64) -> StoreResult<u64> {
        let result = self.collection.delete_many(doc! { "user_id": user_id as i64 }).await?;
        Ok(result.deleted_count)
    }
}
