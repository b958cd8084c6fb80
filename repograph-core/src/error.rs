use crate::job::JobStatus;

/// Top-level repograph error type.
///
/// All fallible operations in `repograph-core` return [`Result<T, RepographError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum RepographError {
    /// Error from the graph store layer (`SQLite` operations, migrations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error while ingesting a repository (discovery, I/O, cancellation).
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Error from the graph engine (parsing, graph validation).
    #[error("Graph engine error: {0}")]
    Graph(#[from] repograph_graphs::GraphError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Illegal ingest job state change.
    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

impl From<repograph_graphs::GraphValidationError> for RepographError {
    fn from(err: repograph_graphs::GraphValidationError) -> Self {
        Self::Graph(err.into())
    }
}

/// Errors from the SQLite-backed graph store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Database schema is from an incompatible version.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// JSON serialization/deserialization of a stored column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No graph is stored for the repository.
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    /// A stored value could not be decoded (unknown status, kind, language).
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Filesystem error preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors during repository ingestion.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// Filesystem I/O error during discovery.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The repository root is missing or not a directory.
    #[error("Cannot resolve path: {0}")]
    RootNotFound(String),

    /// The job's cancel flag was raised.
    #[error("cancelled")]
    Cancelled,

    /// A background task panicked or could not be joined.
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Errors in repograph configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Convenience alias for `Result<T, RepographError>`.
pub type Result<T> = std::result::Result<T, RepographError>;
