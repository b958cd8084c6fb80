use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use repograph_graphs::{CallEdge, FunctionNode, GraphSummary, RepositoryGraph, sort_canonical};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;

use super::{GraphStore, StoredGraphInfo, schema};

const NODE_COLUMNS: &str = "id, qualified_name, name, language, file, start_line, end_line, \
                            start_byte, end_byte, snippet, docstring, kind";

const EDGE_COLUMNS: &str = "caller, callee, status, rationale, callee_text, call_count, lines";

/// SQLite-backed implementation of `GraphStore`.
#[derive(Debug)]
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Open (or create) a store at the given path, creating parent directories.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(StoreError::Sqlite)?;

        // WAL is not available for in-memory databases.
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;
        conn.execute_batch(schema::VIEWS_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO repograph_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        let version: String = conn
            .query_row(
                "SELECT value FROM repograph_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        if version != schema::SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database schema version {version}, expected {}",
                schema::SCHEMA_VERSION
            ))
            .into());
        }
        Ok(())
    }

    /// Helper: read a function node from a row selected with `NODE_COLUMNS`.
    fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<FunctionNode> {
        Ok(FunctionNode {
            id: row.get(0)?,
            qualified_name: row.get(1)?,
            name: row.get(2)?,
            language: parse_column(row, 3)?,
            file: row.get(4)?,
            start_line: row.get(5)?,
            end_line: row.get(6)?,
            start_byte: row.get(7)?,
            end_byte: row.get(8)?,
            snippet: row.get(9)?,
            docstring: row.get(10)?,
            kind: parse_column(row, 11)?,
        })
    }

    /// Helper: read a call edge from a row selected with `EDGE_COLUMNS`.
    fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallEdge> {
        let lines: String = row.get(6)?;
        Ok(CallEdge {
            caller: row.get(0)?,
            callee: row.get(1)?,
            status: parse_column(row, 2)?,
            rationale: row.get(3)?,
            callee_text: row.get(4)?,
            call_count: row.get(5)?,
            lines: serde_json::from_str(&lines)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        })
    }

    fn query_nodes(
        conn: &Connection,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> crate::error::Result<Vec<FunctionNode>> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM function_nodes WHERE {filter}
             ORDER BY file, start_byte, qualified_name"
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(StoreError::Sqlite)?;
        let nodes = stmt
            .query_map(args, Self::row_to_node)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(nodes)
    }

    fn query_edges(
        conn: &Connection,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> crate::error::Result<Vec<CallEdge>> {
        let sql = format!("SELECT {EDGE_COLUMNS} FROM call_edges WHERE {filter}");
        let mut stmt = conn.prepare_cached(&sql).map_err(StoreError::Sqlite)?;
        let mut edges = stmt
            .query_map(args, Self::row_to_edge)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        sort_canonical(&mut [], &mut edges);
        Ok(edges)
    }

    fn load_info(conn: &Connection, repository: &str) -> crate::error::Result<Option<StoredGraphInfo>> {
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT repository, built_at, summary FROM graphs WHERE repository = ?1",
                params![repository],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;
        row.map(decode_info).transpose()
    }
}

/// Decode a text column through `FromStr`.
fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn decode_info(
    (repository, built_at, summary): (String, String, String),
) -> crate::error::Result<StoredGraphInfo> {
    let built_at = DateTime::parse_from_rfc3339(&built_at)
        .map_err(|e| StoreError::Corrupt(format!("built_at of {repository}: {e}")))?
        .with_timezone(&Utc);
    let summary: GraphSummary = serde_json::from_str(&summary).map_err(StoreError::Serialization)?;
    Ok(StoredGraphInfo {
        repository,
        built_at,
        summary,
    })
}

#[async_trait::async_trait]
impl GraphStore for SqliteGraphStore {
    // ── Writes ─────────────────────────────────────────────────────

    async fn replace_graph(&self, graph: &RepositoryGraph) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        let summary = serde_json::to_string(&graph.summary).map_err(StoreError::Serialization)?;
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;

        // Cascades to nodes and edges.
        tx.execute(
            "DELETE FROM graphs WHERE repository = ?1",
            params![graph.repository],
        )
        .map_err(StoreError::Sqlite)?;
        tx.execute(
            "INSERT INTO graphs (repository, built_at, summary) VALUES (?1, ?2, ?3)",
            params![graph.repository, Utc::now().to_rfc3339(), summary],
        )
        .map_err(StoreError::Sqlite)?;

        {
            let mut insert_node = tx
                .prepare_cached(
                    "INSERT INTO function_nodes (repository, id, qualified_name, name, language,
                        file, start_line, end_line, start_byte, end_byte, snippet, docstring, kind)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )
                .map_err(StoreError::Sqlite)?;
            for node in &graph.nodes {
                insert_node
                    .execute(params![
                        graph.repository,
                        node.id,
                        node.qualified_name,
                        node.name,
                        node.language.as_str(),
                        node.file,
                        node.start_line,
                        node.end_line,
                        node.start_byte,
                        node.end_byte,
                        node.snippet,
                        node.docstring,
                        node.kind.as_str(),
                    ])
                    .map_err(StoreError::Sqlite)?;
            }

            let mut insert_edge = tx
                .prepare_cached(
                    "INSERT INTO call_edges (repository, caller, callee, status, rationale,
                        callee_text, call_count, lines)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(StoreError::Sqlite)?;
            for edge in &graph.edges {
                let lines = serde_json::to_string(&edge.lines).map_err(StoreError::Serialization)?;
                insert_edge
                    .execute(params![
                        graph.repository,
                        edge.caller,
                        edge.callee,
                        edge.status.as_str(),
                        edge.rationale,
                        edge.callee_text,
                        edge.call_count,
                        lines,
                    ])
                    .map_err(StoreError::Sqlite)?;
            }
        }

        tx.commit().map_err(StoreError::Sqlite)?;
        debug!(
            repository = %graph.repository,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Stored graph"
        );
        Ok(())
    }

    async fn delete_graph(&self, repository: &str) -> crate::error::Result<bool> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        let deleted = conn
            .execute("DELETE FROM graphs WHERE repository = ?1", params![repository])
            .map_err(StoreError::Sqlite)?;
        Ok(deleted > 0)
    }

    // ── Reads ──────────────────────────────────────────────────────

    async fn load_graph(&self, repository: &str) -> crate::error::Result<Option<RepositoryGraph>> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        // One read transaction so a concurrent replace is never half-visible.
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        let Some(info) = Self::load_info(&tx, repository)? else {
            return Ok(None);
        };
        let mut nodes = Self::query_nodes(&tx, "repository = ?1", &[&repository])?;
        let mut edges = Self::query_edges(&tx, "repository = ?1", &[&repository])?;
        tx.commit().map_err(StoreError::Sqlite)?;

        sort_canonical(&mut nodes, &mut edges);
        Ok(Some(RepositoryGraph {
            repository: info.repository,
            nodes,
            edges,
            summary: info.summary,
        }))
    }

    async fn list_functions(&self, repository: &str) -> crate::error::Result<Vec<FunctionNode>> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        Self::query_nodes(&conn, "repository = ?1", &[&repository])
    }

    async fn get_function(
        &self,
        repository: &str,
        id: &str,
    ) -> crate::error::Result<Option<FunctionNode>> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        let mut nodes = Self::query_nodes(&conn, "repository = ?1 AND id = ?2", &[&repository, &id])?;
        Ok(nodes.pop())
    }

    async fn outgoing_edges(&self, repository: &str, id: &str) -> crate::error::Result<Vec<CallEdge>> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        Self::query_edges(&conn, "repository = ?1 AND caller = ?2", &[&repository, &id])
    }

    async fn incoming_edges(&self, repository: &str, id: &str) -> crate::error::Result<Vec<CallEdge>> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        Self::query_edges(&conn, "repository = ?1 AND callee = ?2", &[&repository, &id])
    }

    async fn list_repositories(&self) -> crate::error::Result<Vec<StoredGraphInfo>> {
        let conn = self.conn.lock().expect("graph store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT repository, built_at, summary FROM graphs ORDER BY repository")
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<(String, String, String)>>>()
            .map_err(StoreError::Sqlite)?;
        rows.into_iter().map(decode_info).collect()
    }
}

#[cfg(test)]
mod tests {
    use repograph_graphs::{FunctionKind, Language, ResolutionStatus};

    use super::*;

    fn make_node(id: &str, file: &str, start_byte: usize) -> FunctionNode {
        FunctionNode {
            id: id.to_string(),
            qualified_name: format!("{}.{id}", file.trim_end_matches(".py")),
            name: id.to_string(),
            language: Language::Python,
            file: file.to_string(),
            start_line: 1,
            end_line: 2,
            start_byte,
            end_byte: start_byte + 10,
            snippet: format!("def {id}():\n    pass"),
            docstring: (id == "a").then(|| "Doc.".to_string()),
            kind: FunctionKind::Function,
        }
    }

    fn make_edge(caller: &str, callee: Option<&str>, status: ResolutionStatus) -> CallEdge {
        CallEdge {
            caller: caller.to_string(),
            callee: callee.map(str::to_string),
            status,
            rationale: "test".to_string(),
            callee_text: callee.unwrap_or("requests.get").to_string(),
            call_count: 2,
            lines: vec![3, 7],
        }
    }

    fn make_graph(repository: &str) -> RepositoryGraph {
        let mut graph = RepositoryGraph {
            repository: repository.to_string(),
            nodes: vec![make_node("a", "m.py", 0), make_node("b", "m.py", 20), make_node("c", "n.py", 0)],
            edges: vec![
                make_edge("a", Some("b"), ResolutionStatus::ResolvedLocal),
                make_edge("a", Some("c"), ResolutionStatus::ResolvedCrossFile),
                make_edge("b", None, ResolutionStatus::ResolvedExternalLibrary),
            ],
            summary: GraphSummary {
                total_files: 2,
                ..GraphSummary::default()
            },
        };
        graph.recompute_summary();
        graph
    }

    #[tokio::test]
    async fn graph_round_trips() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let graph = make_graph("demo");
        store.replace_graph(&graph).await.unwrap();

        let loaded = store.load_graph("demo").await.unwrap().unwrap();
        assert_eq!(loaded, graph);
        assert!(store.load_graph("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_supersedes_previous_graph() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.replace_graph(&make_graph("demo")).await.unwrap();

        let mut smaller = make_graph("demo");
        smaller.nodes.truncate(1);
        smaller.edges.clear();
        smaller.recompute_summary();
        store.replace_graph(&smaller).await.unwrap();

        let functions = store.list_functions("demo").await.unwrap();
        assert_eq!(functions.len(), 1);
        assert!(store.outgoing_edges("demo", "a").await.unwrap().is_empty());
        assert_eq!(store.list_repositories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repositories_are_isolated() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.replace_graph(&make_graph("one")).await.unwrap();
        store.replace_graph(&make_graph("two")).await.unwrap();

        assert!(store.delete_graph("one").await.unwrap());
        assert!(!store.delete_graph("one").await.unwrap());

        let repos = store.list_repositories().await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].repository, "two");
        assert_eq!(repos[0].summary.total_functions, 3);
        assert!(store.list_functions("one").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edge_queries_by_direction() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.replace_graph(&make_graph("demo")).await.unwrap();

        let out = store.outgoing_edges("demo", "a").await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].lines, vec![3, 7]);

        let incoming = store.incoming_edges("demo", "c").await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].caller, "a");

        let external = store.outgoing_edges("demo", "b").await.unwrap();
        assert_eq!(external[0].callee, None);
        assert_eq!(external[0].status, ResolutionStatus::ResolvedExternalLibrary);

        let node = store.get_function("demo", "a").await.unwrap().unwrap();
        assert_eq!(node.docstring.as_deref(), Some("Doc."));
        assert!(store.get_function("demo", "zz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn on_disk_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/graphs.db");
        {
            let store = SqliteGraphStore::open(&path).unwrap();
            store.replace_graph(&make_graph("demo")).await.unwrap();
        }
        let store = SqliteGraphStore::open(&path).unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));
        let loaded = store.load_graph("demo").await.unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 3);
    }
}
