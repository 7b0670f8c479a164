use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    Message, MessageId, NewMessage, Room, Session, TypingIndicator, from_millis, to_millis,
};

use super::{Backend, ChangeFeed, MessageChange, Subscription, TypingChange, storage::Bucket};

const FEED_CAPACITY: usize = 256;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS sessions (
    access_token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS rooms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    user_id TEXT NOT NULL,
    room_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    edited_at INTEGER,
    file_url TEXT
);
CREATE INDEX IF NOT EXISTS messages_room_created ON messages (room_id, created_at);
CREATE TABLE IF NOT EXISTS typing_indicators (
    user_id TEXT NOT NULL,
    room_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, room_id)
);
"#;

const MESSAGE_COLUMNS: &str = "id,content,user_id,room_id,created_at,edited_at,file_url";

type MessageRow = (i64, String, String, String, i64, Option<i64>, Option<String>);

fn message_from_row(
    (id, content, user_id, room_id, created_at, edited_at, file_url): MessageRow,
) -> anyhow::Result<Message> {
    Ok(Message {
        id,
        content,
        user_id: Uuid::parse_str(&user_id)?,
        room_id: Uuid::parse_str(&room_id)?,
        created_at: from_millis(created_at)?,
        edited_at: edited_at.map(from_millis).transpose()?,
        file_url,
    })
}

/// SQLite-backed stand-in for the hosted service: tables, bucket, change feeds and auth.
pub struct SqliteBackend {
    pub(crate) db_pool: SqlitePool,
    bucket: Bucket,
    messages: ChangeFeed<MessageChange>,
    typing: ChangeFeed<TypingChange>,
    /// Live auth-state channels keyed by access token.
    pub(crate) auth_channels: Mutex<HashMap<String, watch::Sender<Option<Session>>>>,
}

impl SqliteBackend {
    pub async fn connect(
        database_url: &str,
        bucket_root: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;

        info!(database_url, "connected to database");
        Self::with_pool(db_pool, Bucket::new(bucket_root)).await
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn in_memory(bucket_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(db_pool, Bucket::new(bucket_root)).await
    }

    pub async fn with_pool(db_pool: SqlitePool, bucket: Bucket) -> anyhow::Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&db_pool)
            .await
            .context("creating schema")?;

        Ok(Self {
            db_pool,
            bucket,
            messages: ChangeFeed::new(FEED_CAPACITY),
            typing: ChangeFeed::new(FEED_CAPACITY),
            auth_channels: Mutex::new(HashMap::new()),
        })
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn select_messages(&self, room_id: Uuid) -> anyhow::Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id=? \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(room_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn insert_message(&self, message: NewMessage) -> anyhow::Result<Message> {
        let row: MessageRow = sqlx::query_as(&format!(
            "INSERT INTO messages (content,user_id,room_id,created_at,file_url) \
             VALUES (?,?,?,?,?) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(&message.content)
        .bind(message.user_id.to_string())
        .bind(message.room_id.to_string())
        .bind(to_millis(OffsetDateTime::now_utc()))
        .bind(&message.file_url)
        .fetch_one(&self.db_pool)
        .await?;

        let message = message_from_row(row)?;
        debug!(id = message.id, room_id = %message.room_id, "message inserted");
        self.messages.publish(MessageChange::Insert(message.clone()));
        Ok(message)
    }

    async fn update_message(
        &self,
        id: MessageId,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "UPDATE messages SET content=?, edited_at=? WHERE id=? RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(content)
        .bind(to_millis(edited_at))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        if let Some(row) = row {
            self.messages.publish(MessageChange::Update(message_from_row(row)?));
        }
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> anyhow::Result<()> {
        let row: Option<(String,)> =
            sqlx::query_as("DELETE FROM messages WHERE id=? RETURNING room_id")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        if let Some((room_id,)) = row {
            let room_id = Uuid::parse_str(&room_id)?;
            self.messages.publish(MessageChange::Delete { id, room_id });
        }
        Ok(())
    }

    async fn insert_room(&self, name: &str) -> anyhow::Result<Room> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO rooms (id,name,created_at) VALUES (?,?,?)")
            .bind(id.to_string())
            .bind(name)
            .bind(to_millis(OffsetDateTime::now_utc()))
            .execute(&self.db_pool)
            .await?;

        info!(%id, name, "room created");
        Ok(Room { id, name: name.to_owned() })
    }

    async fn select_rooms(&self) -> anyhow::Result<Vec<Room>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id,name FROM rooms ORDER BY created_at, id")
                .fetch_all(&self.db_pool)
                .await?;

        rows.into_iter()
            .map(|(id, name)| Ok(Room { id: Uuid::parse_str(&id)?, name }))
            .collect()
    }

    async fn select_room(&self, id: Uuid) -> anyhow::Result<Option<Room>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM rooms WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(row.map(|(name,)| Room { id, name }))
    }

    async fn insert_typing(&self, indicator: TypingIndicator) -> anyhow::Result<()> {
        let result = sqlx::query(
            "INSERT INTO typing_indicators (user_id,room_id,created_at) VALUES (?,?,?) \
             ON CONFLICT DO NOTHING",
        )
        .bind(indicator.user_id.to_string())
        .bind(indicator.room_id.to_string())
        .bind(to_millis(OffsetDateTime::now_utc()))
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() > 0 {
            self.typing.publish(TypingChange::Insert(indicator));
        }
        Ok(())
    }

    async fn delete_typing(&self, indicator: TypingIndicator) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM typing_indicators WHERE user_id=? AND room_id=?")
            .bind(indicator.user_id.to_string())
            .bind(indicator.room_id.to_string())
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() > 0 {
            self.typing.publish(TypingChange::Delete(indicator));
        }
        Ok(())
    }

    async fn upload(&self, user_id: Uuid, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        self.bucket.put(user_id, file_name, bytes).await
    }

    fn subscribe_messages(&self, room_id: Uuid) -> Subscription<MessageChange> {
        self.messages.subscribe(room_id)
    }

    fn subscribe_typing(&self, room_id: Uuid) -> Subscription<TypingChange> {
        self.typing.subscribe(room_id)
    }
}
