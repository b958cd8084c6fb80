/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the graph database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS repograph_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per ingested repository; replaced wholesale on re-ingest
CREATE TABLE IF NOT EXISTS graphs (
    repository TEXT PRIMARY KEY,
    built_at TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '{}'
);

-- Function nodes
CREATE TABLE IF NOT EXISTS function_nodes (
    repository TEXT NOT NULL REFERENCES graphs(repository) ON DELETE CASCADE,
    id TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    name TEXT NOT NULL,
    language TEXT NOT NULL,
    file TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    snippet TEXT NOT NULL,
    docstring TEXT,
    kind TEXT NOT NULL,
    PRIMARY KEY (repository, id)
);
CREATE INDEX IF NOT EXISTS idx_fn_qualified ON function_nodes(repository, qualified_name);
CREATE INDEX IF NOT EXISTS idx_fn_file ON function_nodes(repository, file);

-- Collapsed call edges; callee is NULL unless the target is a node
CREATE TABLE IF NOT EXISTS call_edges (
    repository TEXT NOT NULL REFERENCES graphs(repository) ON DELETE CASCADE,
    caller TEXT NOT NULL,
    callee TEXT,
    status TEXT NOT NULL,
    rationale TEXT NOT NULL,
    callee_text TEXT NOT NULL,
    call_count INTEGER NOT NULL,
    lines TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_edges_caller ON call_edges(repository, caller);
CREATE INDEX IF NOT EXISTS idx_edges_callee ON call_edges(repository, callee);
";

/// Resolved internal edges with both endpoint names.
pub const VIEWS_SQL: &str = r"
CREATE VIEW IF NOT EXISTS resolved_calls AS
SELECT
    e.repository,
    caller.qualified_name AS caller_name,
    callee.qualified_name AS callee_name,
    e.status,
    e.call_count
FROM call_edges e
JOIN function_nodes caller ON caller.repository = e.repository AND caller.id = e.caller
JOIN function_nodes callee ON callee.repository = e.repository AND callee.id = e.callee;
";
