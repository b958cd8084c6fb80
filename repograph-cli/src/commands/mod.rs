pub mod edges;
pub mod export;
pub mod functions;
pub mod ingest;
pub mod repos;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use repograph_core::store::SqliteGraphStore;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a repository and store its call graph
    Ingest(ingest::IngestArgs),
    /// List the functions of a stored repository
    Functions(functions::FunctionsArgs),
    /// Show calls into and out of one function
    Edges(edges::EdgesArgs),
    /// Export a stored graph as JSON or Graphviz DOT
    Export(export::ExportArgs),
    /// Emit one JSON line per function for retrieval indexing
    Units(export::UnitsArgs),
    /// List stored repositories
    Repos(repos::ReposArgs),
}

pub async fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Ingest(args) => ingest::run(args, quiet).await,
        Command::Functions(args) => functions::run(args).await,
        Command::Edges(args) => edges::run(args).await,
        Command::Export(args) => export::run(args).await,
        Command::Units(args) => export::run_units(args).await,
        Command::Repos(args) => repos::run(args).await,
    }
}

/// Database location shared by the read commands.
#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Path to the graph database
    #[arg(long, env = "REPOGRAPH_DB", default_value = ".repograph/graphs.db")]
    pub db: PathBuf,
}

impl DbArgs {
    /// Open an existing database; read commands never create one.
    pub fn open_existing(&self) -> anyhow::Result<SqliteGraphStore> {
        open_existing(&self.db)
    }
}

pub fn open_existing(db_path: &Path) -> anyhow::Result<SqliteGraphStore> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}. Run `repograph ingest` first.",
            db_path.display()
        );
    }
    SqliteGraphStore::open(db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
