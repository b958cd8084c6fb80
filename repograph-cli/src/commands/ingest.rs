use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use repograph_core::config::RepographConfig;
use repograph_core::job::{IngestJob, JobErrorKind};
use repograph_core::pipeline::IngestPipeline;
use repograph_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use repograph_core::store::{GraphStore, SqliteGraphStore};
use repograph_core::worker::spawn_ingest;
use repograph_graphs::RepositoryGraph;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Repository root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Repository identifier (default: the directory name)
    #[arg(long)]
    pub repository: Option<String>,

    /// Config file (default: repograph.toml in the repository root, if any)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Graph database (default: store.path from the config)
    #[arg(long, env = "REPOGRAPH_DB")]
    pub db: Option<PathBuf>,

    /// Parser threads, overriding parse.threads
    #[arg(long)]
    pub threads: Option<usize>,

    /// Print the finished job record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: IngestArgs, quiet: bool) -> anyhow::Result<()> {
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;
    if !root.is_dir() {
        anyhow::bail!("Cannot resolve path: {} is not a directory", root.display());
    }

    let mut config = match &args.config {
        Some(path) => RepographConfig::load(path)
            .with_context(|| format!("Cannot load config: {}", path.display()))?,
        None => RepographConfig::load_or_default(&root).context("Cannot load config")?,
    };
    if let Some(threads) = args.threads {
        config.parse.threads = threads;
    }

    let repository = args
        .repository
        .clone()
        .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string());
    let db_path = args.db.clone().unwrap_or_else(|| config.store_path(&root));

    let store: Arc<dyn GraphStore> = Arc::new(
        SqliteGraphStore::open(&db_path)
            .with_context(|| format!("Cannot open database: {}", db_path.display()))?,
    );
    let pipeline = Arc::new(IngestPipeline::new(config).context("Invalid config")?);
    let progress: Arc<dyn ProgressReporter> = if quiet || args.json {
        Arc::new(NoopReporter)
    } else {
        Arc::new(IndicatifReporter::new())
    };

    tracing::info!(%repository, root = %root.display(), db = %db_path.display(), "Starting ingest");
    let task = spawn_ingest(pipeline, store, root, repository, progress);
    let handle = task.handle.clone();
    let result = task.wait().await;
    let job = handle.snapshot();

    if args.json {
        super::print_json(&job)?;
    }

    match result {
        Ok(graph) => {
            if !args.json && !quiet {
                print_summary(&graph, &job, &db_path);
            }
            Ok(())
        }
        Err(e) => {
            let message = job.failure.unwrap_or_else(|| e.to_string());
            anyhow::bail!("Ingest job failed: {message}")
        }
    }
}

fn print_summary(graph: &RepositoryGraph, job: &IngestJob, db_path: &std::path::Path) {
    let summary = &graph.summary;
    let skipped = job.skipped_files().count();

    println!("Ingested {} into {}", graph.repository, db_path.display());
    println!();
    println!(
        "  Files:      {} ({} parsed, {skipped} skipped)",
        job.files_total, job.files_parsed
    );
    println!("  Functions:  {}", summary.total_functions);
    println!(
        "  Calls:      {} ({} at module level)",
        summary.total_calls, summary.module_level_calls
    );
    println!("    resolved_local             {:>6}", summary.resolved_local);
    println!("    resolved_cross_file        {:>6}", summary.resolved_cross_file);
    println!(
        "    resolved_external_library  {:>6}",
        summary.resolved_external_library
    );
    println!("    unresolved                 {:>6}", summary.unresolved);

    if !job.errors.is_empty() {
        println!();
        println!("  Problems:");
        for entry in &job.errors {
            let marker = if entry.kind == JobErrorKind::UnsupportedConstruct {
                "partial"
            } else {
                "skipped"
            };
            println!(
                "    [{marker}] {} ({}): {}",
                entry.path,
                entry.kind.as_str(),
                entry.message
            );
        }
    }
}
