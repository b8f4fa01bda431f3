//! In-memory conversation store

use super::ConversationStore;
use crate::error::AssistantError;
use crate::models::{Conversation, Message, MessageRole};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

struct Thread {
    conversation: Conversation,
    messages: Vec<Message>,
}

#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    threads: Arc<RwLock<HashMap<Uuid, Thread>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self) -> Result<Conversation> {
        let conversation = Conversation::new();

        self.threads.write().await.insert(
            conversation.id,
            Thread {
                conversation: conversation.clone(),
                messages: Vec::new(),
            },
        );

        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let threads = self.threads.read().await;
        Ok(threads.get(&id).map(|t| t.conversation.clone()))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let threads = self.threads.read().await;
        threads
            .get(&conversation_id)
            .map(|t| t.messages.clone())
            .ok_or(AssistantError::ConversationNotFound(conversation_id))
    }

    async fn append_exchange(
        &self,
        conversation_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(Message, Message)> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .get_mut(&conversation_id)
            .ok_or(AssistantError::ConversationNotFound(conversation_id))?;

        let user = Message::new(conversation_id, MessageRole::User, question.to_string());
        let assistant = Message::new(conversation_id, MessageRole::Assistant, answer.to_string());

        thread.messages.push(user.clone());
        thread.messages.push(assistant.clone());
        thread.conversation.updated_at = Utc::now();

        Ok((user, assistant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_new_conversation_has_no_messages() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation().await.unwrap();

        let found = store.find_conversation(conversation.id).await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(conversation.id));
        assert!(store.list_messages(conversation.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_is_stored_in_order() {
        let store = InMemoryConversationStore::new();
        let id = store.create_conversation().await.unwrap().id;

        let (user, assistant) = assert_ok!(store.append_exchange(id, "first?", "one").await);
        assert_eq!(user.conversation_id, id);
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_ok!(store.append_exchange(id, "second?", "two").await);

        let messages = assert_ok!(store.list_messages(id).await);
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first?", "one", "second?", "two"]);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let store = InMemoryConversationStore::new();
        let missing = Uuid::new_v4();

        assert!(store.find_conversation(missing).await.unwrap().is_none());
        assert_err!(store.list_messages(missing).await);
        assert!(matches!(
            store.append_exchange(missing, "q", "a").await,
            Err(AssistantError::ConversationNotFound(id)) if id == missing
        ));
    }
}
