//! Graph store seam
//!
//! Transactions and categories live in a property graph:
//! `(:Transaction)-[:BELONGS_TO]->(:Category)`.
//! Records coming back from the store are mapped to [`GraphNode`] here,
//! before they reach the rest of the crate.

use crate::models::{GraphNode, TransactionNode};
use crate::Result;
use async_trait::async_trait;

pub mod memory;
pub mod neo4j;
pub mod persistence;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jGraph;
pub use persistence::{GraphPersistence, PersistReport};

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert the category by exact name, create the transaction node and
    /// link them, as one atomic write.
    async fn record_transaction(&self, category: &str, transaction: &TransactionNode) -> Result<()>;

    /// Run a read query and return every node it produced
    async fn execute_query(&self, cypher: &str) -> Result<Vec<GraphNode>>;
}
