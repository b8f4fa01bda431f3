//! Scripted collaborators for unit tests

use crate::error::AssistantError;
use crate::graph::{GraphStore, MemoryGraph};
use crate::llm::{ChunkStream, GenerationRequest, GenerativeModel};
use crate::memory::{ConversationStore, InMemoryConversationStore};
use crate::models::{Conversation, GraphNode, Message, TransactionNode};
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

pub enum ScriptedStream {
    Chunks(Vec<&'static str>),
    /// Yields the chunks, then an error
    FailAfter(Vec<&'static str>, &'static str),
    /// The stream cannot be opened at all
    OpenError(&'static str),
}

/// Model that replays queued answers and records what it was asked
#[derive(Default)]
pub struct ScriptedModel {
    completions: Mutex<VecDeque<Result<String>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    requests: Mutex<Vec<GenerationRequest>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completions(answers: &[&str]) -> Self {
        let model = Self::new();
        for answer in answers {
            model.push_completion(Ok(answer.to_string()));
        }
        model
    }

    pub fn push_completion(&self, answer: Result<String>) {
        self.completions.lock().unwrap().push_back(answer);
    }

    pub fn push_stream(&self, stream: ScriptedStream) {
        self.streams.lock().unwrap().push_back(stream);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    fn record(&self, request: &GenerationRequest) {
        self.requests.lock().unwrap().push(request.clone());
        self.call_times.lock().unwrap().push(Instant::now());
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.record(request);
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AssistantError::LlmError("no scripted completion".into())))
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        self.record(request);
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedStream::OpenError("no scripted stream"));

        match script {
            ScriptedStream::Chunks(chunks) => {
                let items: Vec<Result<String>> =
                    chunks.into_iter().map(|c| Ok(c.to_string())).collect();
                Ok(stream::iter(items).boxed())
            }
            ScriptedStream::FailAfter(chunks, message) => {
                let mut items: Vec<Result<String>> =
                    chunks.into_iter().map(|c| Ok(c.to_string())).collect();
                items.push(Err(AssistantError::LlmError(message.to_string())));
                Ok(stream::iter(items).boxed())
            }
            ScriptedStream::OpenError(message) => {
                Err(AssistantError::LlmError(message.to_string()))
            }
        }
    }
}

/// Graph whose reads return a fixed node set (or fail) and record the Cypher
pub struct ScriptedGraph {
    nodes: std::result::Result<Vec<GraphNode>, String>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedGraph {
    pub fn returning(nodes: Vec<GraphNode>) -> Self {
        Self {
            nodes: Ok(nodes),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            nodes: Err(message.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphStore for ScriptedGraph {
    async fn record_transaction(
        &self,
        _category: &str,
        _transaction: &TransactionNode,
    ) -> Result<()> {
        Ok(())
    }

    async fn execute_query(&self, cypher: &str) -> Result<Vec<GraphNode>> {
        self.queries.lock().unwrap().push(cypher.to_string());
        self.nodes
            .clone()
            .map_err(AssistantError::QueryExecutionError)
    }
}

/// In-memory graph whose Nth writes (0-based) fail
pub struct FlakyGraph {
    inner: MemoryGraph,
    failing: Vec<usize>,
    writes: AtomicUsize,
}

impl FlakyGraph {
    pub fn failing_on(indices: &[usize]) -> Self {
        Self {
            inner: MemoryGraph::new(),
            failing: indices.to_vec(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryGraph {
        &self.inner
    }
}

#[async_trait]
impl GraphStore for FlakyGraph {
    async fn record_transaction(
        &self,
        category: &str,
        transaction: &TransactionNode,
    ) -> Result<()> {
        let index = self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&index) {
            return Err(AssistantError::GraphError("connection reset".into()));
        }
        self.inner.record_transaction(category, transaction).await
    }

    async fn execute_query(&self, cypher: &str) -> Result<Vec<GraphNode>> {
        self.inner.execute_query(cypher).await
    }
}

/// Conversation store whose writes always fail
#[derive(Default)]
pub struct ReadOnlyStore {
    inner: InMemoryConversationStore,
}

impl ReadOnlyStore {
    pub fn inner(&self) -> &InMemoryConversationStore {
        &self.inner
    }
}

#[async_trait]
impl ConversationStore for ReadOnlyStore {
    async fn create_conversation(&self) -> Result<Conversation> {
        self.inner.create_conversation().await
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.inner.find_conversation(id).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.inner.list_messages(conversation_id).await
    }

    async fn append_exchange(
        &self,
        _conversation_id: Uuid,
        _question: &str,
        _answer: &str,
    ) -> Result<(Message, Message)> {
        Err(AssistantError::DatabaseError("database is read-only".into()))
    }
}
