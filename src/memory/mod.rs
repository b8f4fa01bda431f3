//! Conversation history
//!
//! Conversations and their messages, in Postgres when a database URL is
//! configured and in process memory otherwise.

use crate::models::{Conversation, Message};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod postgres;
pub mod store;

pub use postgres::PgConversationStore;
pub use store::InMemoryConversationStore;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self) -> Result<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Messages of a conversation, oldest first
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Store a question and its answer together. Either both rows are
    /// written or neither is.
    async fn append_exchange(
        &self,
        conversation_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(Message, Message)>;
}

/// Pick the backend for the given database URL, falling back to memory
pub fn connect_store(database_url: Option<&str>) -> Arc<dyn ConversationStore> {
    if let Some(url) = database_url {
        match PgConversationStore::connect_lazy(url) {
            Ok(store) => {
                info!("Conversation store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres conversation store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Conversation store backend: in-memory");
    Arc::new(InMemoryConversationStore::new())
}
