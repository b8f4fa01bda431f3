//! Conversational turn orchestration
//!
//! One turn answers one question:
//! LoadHistory → Translate → ExecuteQuery → Generate → Stream → Persist.
//! Context is rebuilt from the conversation store on every turn, so no chat
//! session lives between requests.

use crate::error::AssistantError;
use crate::graph::GraphStore;
use crate::llm::{ChatTurn, GenerationRequest, GenerativeModel};
use crate::memory::ConversationStore;
use crate::models::{GraphNode, Message, MessageRole};
use crate::translator::QueryTranslator;
use crate::Result;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Seeded only into the first turn of a conversation
pub const SYSTEM_INSTRUCTION: &str = "Your job is to answer the user's question about their own \
bank transactions. You are given the relevant transactions as context; answer as accurately as \
you can using only that information. Analyse each transaction carefully, do not invent any, and \
do arithmetic step by step when totals are needed. Sound natural and human rather than robotic. \
The default currency is naira (₦). Describe dates in words, for example 3 January 2025.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    LoadHistory,
    Translate,
    ExecuteQuery,
    Generate,
    Stream,
    Persist,
    Done,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::LoadHistory => "LOAD_HISTORY",
            TurnState::Translate => "TRANSLATE",
            TurnState::ExecuteQuery => "EXECUTE_QUERY",
            TurnState::Generate => "GENERATE",
            TurnState::Stream => "STREAM",
            TurnState::Persist => "PERSIST",
            TurnState::Done => "DONE",
            TurnState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// A turn whose conversation exists and whose history is loaded
#[derive(Debug)]
pub struct PendingTurn {
    pub conversation_id: Uuid,
    pub question: String,
    history: Vec<Message>,
    state: TurnState,
}

impl PendingTurn {
    fn advance(&mut self, next: TurnState) {
        debug!(
            conversation_id = %self.conversation_id,
            from = %self.state,
            to = %next,
            "Turn transition"
        );
        self.state = next;
    }

    fn fail(&mut self, error: AssistantError) -> AssistantError {
        warn!(
            conversation_id = %self.conversation_id,
            state = %self.state,
            "Turn failed: {}",
            error
        );
        self.advance(TurnState::Failed);
        error
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub conversation_id: Uuid,
    pub answer: String,
    pub chunks_delivered: usize,
    pub context_nodes: usize,
}

pub struct ConversationOrchestrator {
    model: Arc<dyn GenerativeModel>,
    translator: Arc<QueryTranslator>,
    graph: Arc<dyn GraphStore>,
    store: Arc<dyn ConversationStore>,
}

impl ConversationOrchestrator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        translator: Arc<QueryTranslator>,
        graph: Arc<dyn GraphStore>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            model,
            translator,
            graph,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Check the conversation exists and load its history. Runs before
    /// anything is streamed, so an unknown id can be reported cleanly.
    pub async fn start_turn(&self, conversation_id: Uuid, question: &str) -> Result<PendingTurn> {
        debug!(%conversation_id, state = %TurnState::LoadHistory, "Turn started");

        if self.store.find_conversation(conversation_id).await?.is_none() {
            return Err(AssistantError::ConversationNotFound(conversation_id));
        }

        let history = self.store.list_messages(conversation_id).await?;

        Ok(PendingTurn {
            conversation_id,
            question: question.to_string(),
            history,
            state: TurnState::LoadHistory,
        })
    }

    /// Translate, query, generate and stream into `sink`, then persist the
    /// exchange. Chunks already sent stay delivered whatever happens later.
    pub async fn complete_turn(
        &self,
        mut turn: PendingTurn,
        sink: &mpsc::Sender<String>,
    ) -> Result<TurnOutcome> {
        turn.advance(TurnState::Translate);
        let nodes = match self.translator.translate(&turn.question).await {
            Ok(cypher) => {
                turn.advance(TurnState::ExecuteQuery);
                self.graph.execute_query(&cypher).await.unwrap_or_else(|e| {
                    warn!(%cypher, "Graph query failed, continuing with empty context: {}", e);
                    Vec::new()
                })
            }
            Err(e) => {
                warn!("Translation failed, continuing with empty context: {}", e);
                Vec::new()
            }
        };
        let context_nodes = nodes.len();

        turn.advance(TurnState::Generate);
        let request = build_request(&turn.history, &turn.question, &nodes)
            .map_err(|e| turn.fail(e))?;

        let mut chunks = match self.model.stream(&request).await {
            Ok(chunks) => chunks,
            Err(e) => return Err(turn.fail(AssistantError::StreamError(e.to_string()))),
        };

        turn.advance(TurnState::Stream);
        let mut answer = String::new();
        let mut chunks_delivered = 0;

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(turn.fail(AssistantError::StreamError(e.to_string()))),
            };

            answer.push_str(&chunk);
            if sink.send(chunk).await.is_err() {
                return Err(turn.fail(AssistantError::ClientDisconnected));
            }
            chunks_delivered += 1;
        }

        if let Err(e) = wait_until_delivered(sink).await {
            return Err(turn.fail(e));
        }

        turn.advance(TurnState::Persist);
        if let Err(e) = self
            .store
            .append_exchange(turn.conversation_id, &turn.question, &answer)
            .await
        {
            return Err(turn.fail(e));
        }

        turn.advance(TurnState::Done);
        info!(
            conversation_id = %turn.conversation_id,
            chunks_delivered,
            context_nodes,
            "Turn completed"
        );

        Ok(TurnOutcome {
            conversation_id: turn.conversation_id,
            answer,
            chunks_delivered,
            context_nodes,
        })
    }

    pub async fn run_turn(
        &self,
        conversation_id: Uuid,
        question: &str,
        sink: &mpsc::Sender<String>,
    ) -> Result<TurnOutcome> {
        let turn = self.start_turn(conversation_id, question).await?;
        self.complete_turn(turn, sink).await
    }
}

/// Resolve once the receiver has taken every queued chunk. A receiver that
/// goes away first counts as a disconnect.
async fn wait_until_delivered(sink: &mpsc::Sender<String>) -> Result<()> {
    while sink.capacity() < sink.max_capacity() {
        tokio::select! {
            _ = sink.closed() => return Err(AssistantError::ClientDisconnected),
            _ = tokio::time::sleep(DRAIN_POLL) => {}
        }
    }
    Ok(())
}

/// Pretty JSON of each node's properties, separated by blank lines
pub fn render_context(nodes: &[GraphNode]) -> Result<String> {
    let mut blocks = Vec::with_capacity(nodes.len());

    for node in nodes {
        let block = match node {
            GraphNode::Transaction(t) => serde_json::to_string_pretty(t)?,
            GraphNode::Category(c) => serde_json::to_string_pretty(c)?,
        };
        blocks.push(block);
    }

    Ok(blocks.join("\n\n"))
}

fn build_request(
    history: &[Message],
    question: &str,
    nodes: &[GraphNode],
) -> Result<GenerationRequest> {
    let prompt = format!(
        "<Query>{}</Query>\n\n<RelevantContext>{}</RelevantContext>",
        question,
        render_context(nodes)?
    );

    if history.is_empty() {
        return Ok(GenerationRequest::with_instruction(SYSTEM_INSTRUCTION, prompt));
    }

    let history = history
        .iter()
        .map(|m| match m.role {
            MessageRole::User => ChatTurn::user(m.content.clone()),
            MessageRole::Assistant => ChatTurn::model(m.content.clone()),
        })
        .collect();

    Ok(GenerationRequest {
        system_instruction: None,
        history,
        prompt,
    })
}
