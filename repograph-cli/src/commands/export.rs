use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use repograph_core::query::{self, ExportFormat};

use super::DbArgs;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Repository identifier used at ingest
    pub repository: String,

    /// Output format: json, dot
    #[arg(long, default_value = "json")]
    pub format: ExportFormat,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub db: DbArgs,
}

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let store = args.db.open_existing()?;
    let graph = query::require_graph(&store, &args.repository).await?;
    let rendered = query::export(&graph, args.format)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            tracing::info!(path = %path.display(), format = %args.format, "Graph exported");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct UnitsArgs {
    /// Repository identifier used at ingest
    pub repository: String,

    #[command(flatten)]
    pub db: DbArgs,
}

/// One JSON object per line: id, qualified name, file, snippet, docstring.
pub async fn run_units(args: UnitsArgs) -> anyhow::Result<()> {
    let store = args.db.open_existing()?;
    let graph = query::require_graph(&store, &args.repository).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for unit in graph.retrievable_units() {
        serde_json::to_writer(&mut out, &unit)?;
        writeln!(out)?;
    }
    Ok(())
}
