//! MongoDB connection wrapper.

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::info;

/// Handle to the bot's MongoDB database.
#[derive(Debug, Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    /// Connect, ping and make sure the indexes the repositories rely on exist.
    ///
    /// # Errors
    /// Returns error if the server is unreachable or rejects the ping.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        client.database("admin").run_command(doc! { "ping": 1 }).await?;
        info!("Successfully connected to MongoDB");

        let database = Self {
            db: client.database(db_name),
        };
        database.ensure_indexes().await?;
        Ok(database)
    }

    pub async fn ping(&self) -> mongodb::error::Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.collection::<mongodb::bson::Document>("users")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        let reminders = self.collection::<mongodb::bson::Document>("reminders");
        reminders
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;
        reminders
            .create_index(IndexModel::builder().keys(doc! { "sent": 1, "fire_at": 1 }).build())
            .await?;

        self.collection::<mongodb::bson::Document>("history")
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "created_at": -1 }).build())
            .await?;

        Ok(())
    }
}
