//! In-memory graph store for development
//!
//! Mirrors the MERGE/CREATE semantics of the Neo4j writes. It cannot
//! interpret Cypher: `execute_query` returns every stored node, except for
//! the out-of-domain query, which matches nothing.

use super::GraphStore;
use crate::models::{CategoryNode, GraphNode, TransactionNode};
use crate::translator::EMPTY_RESULT_QUERY;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct GraphState {
    categories: Vec<CategoryNode>,
    /// Each transaction with the index of the category it belongs to
    transactions: Vec<(TransactionNode, usize)>,
}

pub struct MemoryGraph {
    state: Arc<RwLock<GraphState>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
        }
    }

    pub async fn category_count(&self) -> usize {
        self.state.read().await.categories.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    /// Category name each transaction is linked to, in insertion order
    pub async fn links(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .transactions
            .iter()
            .map(|(_, idx)| state.categories[*idx].name.clone())
            .collect()
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn record_transaction(
        &self,
        category: &str,
        transaction: &TransactionNode,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        let idx = match state.categories.iter().position(|c| c.name == category) {
            Some(idx) => idx,
            None => {
                state.categories.push(CategoryNode {
                    name: category.to_string(),
                });
                state.categories.len() - 1
            }
        };

        state.transactions.push((transaction.clone(), idx));
        Ok(())
    }

    async fn execute_query(&self, cypher: &str) -> Result<Vec<GraphNode>> {
        // No Category is named "empty"
        if cypher.trim() == EMPTY_RESULT_QUERY {
            return Ok(Vec::new());
        }

        debug!(%cypher, "In-memory graph ignores Cypher and returns all nodes");
        let state = self.state.read().await;

        let nodes = state
            .transactions
            .iter()
            .map(|(t, _)| GraphNode::Transaction(t.clone()))
            .chain(state.categories.iter().cloned().map(GraphNode::Category))
            .collect();

        Ok(nodes)
    }
}
