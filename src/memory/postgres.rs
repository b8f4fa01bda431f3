//! Postgres-backed conversation store

use super::ConversationStore;
use crate::error::AssistantError;
use crate::models::{Conversation, Message, MessageRole};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

pub struct PgConversationStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> AssistantError + '_ {
    move |e| AssistantError::DatabaseError(format!("{}: {}", context, e))
}

impl PgConversationStore {
    /// Build a lazily-connecting pool; the schema is created on first use
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(db_error("Failed to create connection pool"))?;

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        let pool = &self.pool;

        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversations (
                      id UUID PRIMARY KEY,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS messages (
                      id UUID PRIMARY KEY,
                      conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      seq BIGSERIAL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_messages_conversation_time
                    ON messages (conversation_id, created_at, seq);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_error("Failed to initialize conversation schema"))?;

        Ok(())
    }

    async fn insert_message(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        message: &Message,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error("Failed to insert message"))?;

        Ok(())
    }
}

fn row_to_conversation(row: &PgRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.try_get("id").map_err(db_error("Bad conversation id"))?,
        created_at: row.try_get("created_at").map_err(db_error("Bad created_at"))?,
        updated_at: row.try_get("updated_at").map_err(db_error("Bad updated_at"))?,
    })
}

fn row_to_message(row: &PgRow) -> Result<Message> {
    let role: String = row.try_get("role").map_err(db_error("Bad message role"))?;
    let role = MessageRole::from_db(&role).unwrap_or_else(|| {
        warn!(%role, "Unrecognised message role, treating as user");
        MessageRole::User
    });

    Ok(Message {
        id: row.try_get("id").map_err(db_error("Bad message id"))?,
        conversation_id: row
            .try_get("conversation_id")
            .map_err(db_error("Bad conversation id"))?,
        role,
        content: row.try_get("content").map_err(db_error("Bad message content"))?,
        created_at: row.try_get("created_at").map_err(db_error("Bad created_at"))?,
        updated_at: row.try_get("updated_at").map_err(db_error("Bad updated_at"))?,
    })
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_conversation(&self) -> Result<Conversation> {
        self.ensure_schema().await?;
        let conversation = Conversation::new();

        sqlx::query("INSERT INTO conversations (id, created_at, updated_at) VALUES ($1, $2, $3)")
            .bind(conversation.id)
            .bind(conversation.created_at)
            .bind(conversation.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to create conversation"))?;

        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT id, created_at, updated_at FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load conversation"))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        if self.find_conversation(conversation_id).await?.is_none() {
            return Err(AssistantError::ConversationNotFound(conversation_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, updated_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load messages"))?;

        rows.iter().map(row_to_message).collect()
    }

    async fn append_exchange(
        &self,
        conversation_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(Message, Message)> {
        self.ensure_schema().await?;

        let user = Message::new(conversation_id, MessageRole::User, question.to_string());
        let mut assistant =
            Message::new(conversation_id, MessageRole::Assistant, answer.to_string());
        // Both rows share a timestamp, so `seq` keeps the user row first
        assistant.created_at = user.created_at;
        assistant.updated_at = user.updated_at;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(conversation_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to update conversation"))?;

        if touched.rows_affected() == 0 {
            return Err(AssistantError::ConversationNotFound(conversation_id));
        }

        Self::insert_message(&mut tx, &user).await?;
        Self::insert_message(&mut tx, &assistant).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit exchange"))?;

        Ok((user, assistant))
    }
}
