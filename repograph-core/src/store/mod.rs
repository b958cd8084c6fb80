pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use repograph_graphs::{CallEdge, FunctionNode, GraphSummary, RepositoryGraph};
use serde::{Deserialize, Serialize};

pub use sqlite::SqliteGraphStore;

/// One stored repository graph, without its nodes and edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGraphInfo {
    pub repository: String,
    pub built_at: DateTime<Utc>,
    pub summary: GraphSummary,
}

/// Durable home of repository graphs. The ingest pipeline is the only writer.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    // ── Writes ─────────────────────────────────────────────────────

    /// Replace everything stored for `graph.repository` in one transaction.
    /// Readers see either the previous graph or the new one.
    async fn replace_graph(&self, graph: &RepositoryGraph) -> crate::error::Result<()>;

    /// Delete a repository's graph. Returns whether one existed.
    async fn delete_graph(&self, repository: &str) -> crate::error::Result<bool>;

    // ── Reads ──────────────────────────────────────────────────────

    /// The whole graph, in canonical order.
    async fn load_graph(&self, repository: &str) -> crate::error::Result<Option<RepositoryGraph>>;

    /// Every function node of a repository, ordered by file and position.
    async fn list_functions(&self, repository: &str) -> crate::error::Result<Vec<FunctionNode>>;

    /// A function node by id.
    async fn get_function(
        &self,
        repository: &str,
        id: &str,
    ) -> crate::error::Result<Option<FunctionNode>>;

    /// Edges whose caller is `id`.
    async fn outgoing_edges(&self, repository: &str, id: &str) -> crate::error::Result<Vec<CallEdge>>;

    /// Edges whose callee is `id`.
    async fn incoming_edges(&self, repository: &str, id: &str) -> crate::error::Result<Vec<CallEdge>>;

    /// Every stored repository, by name.
    async fn list_repositories(&self) -> crate::error::Result<Vec<StoredGraphInfo>>;
}
